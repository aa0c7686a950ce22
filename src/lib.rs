//! PsiCash action pipeline library exports

pub mod client;
pub mod core;
pub mod pipeline;
pub mod script;

#[cfg(test)]
pub mod test_support;
