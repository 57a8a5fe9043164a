pub mod entity;
pub mod message;
pub mod outcome;
pub mod reliability;
