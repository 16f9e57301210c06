pub mod enums;
pub mod listmodels;
pub mod proofread;
pub mod settings;
