//! Sample capabilities for the Smart Team agents.
//!
//! - [`GetWeather`]: current temperature for a city
//! - [`FetchPage`]: paragraph text of a web page
//! - [`CreateVirtualenv`], [`InstallPackage`], [`ExecuteCode`]: Python
//!   environments and code execution inside a [`PythonWorkspace`]

pub mod fetch;
pub mod python;
pub mod weather;

pub use fetch::{extract_paragraphs, FetchPage, DEFAULT_MAX_WORDS};
pub use python::{
    validate_package_name, CreateVirtualenv, ExecuteCode, InstallPackage, PythonWorkspace,
    DEFAULT_ENV,
};
pub use weather::{format_temperature, GetWeather, WTTR_URL};
