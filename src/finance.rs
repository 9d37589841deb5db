//! Revenue, cost and profit rollups per project and across the portfolio.
//!
//! Amounts are summed as-is; nothing is rounded to cents here.

use crate::models::{Client, Invoice, Project, ProjectCost};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFinance {
    pub project_id: String,
    pub name: Option<String>,
    pub status: String,
    pub target_revenue: f64,
    pub client_name: Option<String>,
    pub client_company: Option<String>,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub paid_amount: f64,
    /// Target minus paid. Negative when a project is overpaid.
    pub pending_amount: f64,
    /// Target minus cost, not collected revenue minus cost.
    pub net_profit: f64,
    pub invoices: Vec<Invoice>,
    pub costs: Vec<ProjectCost>,
}

impl ProjectFinance {
    pub fn bucket(&self) -> PaymentBucket {
        classify(self.paid_amount, self.pending_amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentBucket {
    Pending,
    FullyPaid,
    Unclassified,
}

pub fn classify(paid_amount: f64, pending_amount: f64) -> PaymentBucket {
    if pending_amount > 0.0 {
        PaymentBucket::Pending
    } else if paid_amount > 0.0 && pending_amount == 0.0 {
        PaymentBucket::FullyPaid
    } else {
        PaymentBucket::Unclassified
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinanceFilter {
    #[default]
    Pending,
    FullyPaid,
    All,
}

impl FinanceFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" | "fully_pending" | "fully-pending" => Some(Self::Pending),
            "paid" | "fully_paid" | "fully-paid" => Some(Self::FullyPaid),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn admits(self, finance: &ProjectFinance) -> bool {
        match self {
            Self::Pending => finance.bucket() == PaymentBucket::Pending,
            Self::FullyPaid => finance.bucket() == PaymentBucket::FullyPaid,
            Self::All => true,
        }
    }
}

pub fn project_finance(
    project: &Project,
    client: Option<&Client>,
    invoices: Vec<Invoice>,
    costs: Vec<ProjectCost>,
) -> ProjectFinance {
    let total_revenue: f64 = invoices.iter().map(|invoice| invoice.amount).sum();
    let total_cost: f64 = costs.iter().map(|cost| cost.amount).sum();
    let paid_amount: f64 = invoices
        .iter()
        .filter(|invoice| invoice.paid)
        .map(|invoice| invoice.amount)
        .sum();

    ProjectFinance {
        project_id: project.id.clone(),
        name: project.name.clone(),
        status: project.status.clone(),
        target_revenue: project.target_revenue,
        client_name: client.and_then(|client| client.name.clone()),
        client_company: client.and_then(|client| client.company.clone()),
        total_revenue,
        total_cost,
        paid_amount,
        pending_amount: project.target_revenue - paid_amount,
        net_profit: project.target_revenue - total_cost,
        invoices,
        costs,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceSummary {
    pub target_revenue: f64,
    pub invoiced_amount: f64,
    pub total_cost: f64,
    pub net_profit: f64,
    pub paid_amount: f64,
    pub pending_amount: f64,
    pub total_projects: usize,
}

/// Portfolio totals over every non-Inactive project in `projects`.
pub fn summarize(projects: &[ProjectFinance]) -> FinanceSummary {
    projects
        .iter()
        .filter(|finance| finance.status != crate::models::INACTIVE_STATUS)
        .fold(FinanceSummary::default(), |mut summary, finance| {
            summary.target_revenue += finance.target_revenue;
            summary.invoiced_amount += finance.total_revenue;
            summary.total_cost += finance.total_cost;
            summary.net_profit += finance.net_profit;
            summary.paid_amount += finance.paid_amount;
            summary.pending_amount += finance.pending_amount;
            summary.total_projects += 1;
            summary
        })
}

/// Case-insensitive match on project name, client name or client company.
pub fn matches_search(finance: &ProjectFinance, search: &str) -> bool {
    let query = search.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    [&finance.name, &finance.client_name, &finance.client_company]
        .into_iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(&query))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceOverview {
    pub summary: FinanceSummary,
    pub filter: FinanceFilter,
    pub projects: Vec<ProjectFinance>,
}

pub fn overview(projects: Vec<ProjectFinance>, filter: FinanceFilter, search: Option<&str>) -> FinanceOverview {
    let summary = summarize(&projects);
    let projects = projects
        .into_iter()
        .filter(|finance| finance.status != crate::models::INACTIVE_STATUS)
        .filter(|finance| filter.admits(finance))
        .filter(|finance| search.map_or(true, |query| matches_search(finance, query)))
        .collect();

    FinanceOverview {
        summary,
        filter,
        projects,
    }
}
