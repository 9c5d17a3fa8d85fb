use serde::{Deserialize, Serialize};

/// Search filters passed through to every source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchParams {
    /// Maximum monthly rent sent to the source
    pub max_rent: u32,
    /// Who the room is for ("males", "females", "couples", ...)
    pub rooms_for: Option<String>,
    /// Room type ("single", "double", ...)
    pub room_type: Option<String>,
    /// Results requested per search page
    pub per_page: u32,
    /// Only rooms with an en-suite bathroom
    pub ensuite_only: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_rent: 750,
            rooms_for: None,
            room_type: None,
            per_page: 50,
            ensuite_only: false,
        }
    }
}
