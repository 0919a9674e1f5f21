pub mod domain;
pub mod html;
pub mod json_ld;

pub use domain::{extract_domain, resolve};
