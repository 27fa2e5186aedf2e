pub mod ask;
pub mod enums;
pub mod filetree;
pub mod listmodels;
pub mod queries;
