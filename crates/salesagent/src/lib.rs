pub mod assets;
pub mod capabilities;
pub mod errors;
pub mod instructions;
pub mod lifecycle;
pub mod models;
pub mod sales_data;
pub mod service;
pub mod session;
pub mod toolbox;
