//! Channel inputs.

use serde::Deserialize;
use validator::Validate;

use crate::domain::{ChannelFilter, PageRequest, UserId};

fn default_visible() -> bool {
    true
}

/// Admin channel creation request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelInput {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 participants required"))]
    pub participant_ids: Vec<UserId>,

    #[validate(length(min = 1, max = 255, message = "Target id must be 1-255 characters"))]
    pub target_id: Option<String>,

    #[serde(default = "default_visible")]
    pub is_visible: bool,
}

/// Channel listing arguments
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelListArgs {
    pub filter: ChannelFilter,
    pub page: PageRequest,
}

impl ChannelListArgs {
    pub fn page(page: PageRequest) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}
