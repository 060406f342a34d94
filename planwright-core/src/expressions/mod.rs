mod expr;
mod template;

pub use expr::{is_valid_name, parse_expr, Builtin, Expr, ExprError, ExprHead, Filter, BUILTIN_PREFIX};
pub use template::{is_templated, parse_template, Segment, Template, TemplateError};
