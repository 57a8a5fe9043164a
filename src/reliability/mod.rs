pub mod checksum;
pub mod persister;
pub mod scorer;
pub mod weights;
