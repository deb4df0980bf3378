pub mod load_checker;
pub mod transfer_engine;
