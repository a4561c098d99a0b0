pub mod cache;
pub mod configuration;
pub mod database;
pub mod db;
pub mod health;
pub mod helpers;
pub mod models;
pub mod routes;
pub mod services;
pub mod startup;
pub mod telemetry;
