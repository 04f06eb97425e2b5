//! Report inputs.

use serde::Deserialize;
use validator::Validate;

use crate::domain::{PageRequest, ReportFilter, ReportPatch, ReportState, ReportTargetKind};

/// File a report against a channel or message
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportInput {
    #[serde(rename = "type")]
    pub target_kind: ReportTargetKind,

    pub target_id: i64,

    #[validate(length(min = 1, max = 50, message = "Category must be 1-50 characters"))]
    pub category: String,

    #[validate(length(min = 1, max = 2000, message = "Report content must be 1-2000 characters"))]
    pub content: String,

    #[validate(length(max = 255, message = "Etc must be at most 255 characters"))]
    pub etc: Option<String>,
}

/// Author's edit of a report
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateReportInput {
    #[validate(length(min = 1, max = 50, message = "Category must be 1-50 characters"))]
    pub category: Option<String>,

    #[validate(length(min = 1, max = 2000, message = "Report content must be 1-2000 characters"))]
    pub content: Option<String>,

    #[validate(length(max = 255, message = "Etc must be at most 255 characters"))]
    pub etc: Option<String>,
}

impl From<UpdateReportInput> for ReportPatch {
    fn from(input: UpdateReportInput) -> Self {
        Self {
            category: input.category,
            content: input.content,
            etc: input.etc,
            ..Self::default()
        }
    }
}

/// Admin handling of a report
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct AdminReportUpdateInput {
    pub state: Option<ReportState>,

    #[validate(length(max = 2000, message = "Admin memo must be at most 2000 characters"))]
    pub admin_memo: Option<String>,
}

impl From<AdminReportUpdateInput> for ReportPatch {
    fn from(input: AdminReportUpdateInput) -> Self {
        Self {
            state: input.state,
            admin_memo: input.admin_memo,
            ..Self::default()
        }
    }
}

/// Report listing arguments
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportListArgs {
    pub filter: ReportFilter,
    pub page: PageRequest,
}

impl ReportListArgs {
    pub fn page(page: PageRequest) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}
