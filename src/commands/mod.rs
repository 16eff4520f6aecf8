pub mod load;
pub mod members;
pub mod operation;
pub mod status;
