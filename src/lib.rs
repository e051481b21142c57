pub mod config;
pub mod latex_lexer;
pub mod latex_parser;
pub mod latex_tree;
pub mod math_field;
pub mod registry;
