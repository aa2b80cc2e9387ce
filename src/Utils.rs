//! different utility modules used throughout the project
/// tiny module to save profiles into CSV files
pub mod logger;
/// tiny module to plot the computed fields
pub mod plots;
