pub mod collector;
pub mod config;
pub mod datekey;
pub mod loader;
pub mod search;
pub mod storage;
pub mod tracing;

pub mod util {
    pub mod db;
    pub mod env;
}
