use serde::{Deserialize, Serialize};

/// Collaborator views consumed by the chat engine. Listings and users are
/// owned elsewhere; the chat core only reads the fields it needs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Active,
    Sold,
    Archived,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyRef {
    pub property_id: String,
    pub owner_id: Option<String>,
    pub realtor_id: Option<String>,
    pub status: PropertyStatus,
    pub address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub user_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Pending,
    Approved,
    Rejected,
}

/// Payload handed to the deal sink when a chat is converted into a deal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewDeal {
    pub property_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub realtor_id: Option<String>,
    pub status: DealStatus,
}
