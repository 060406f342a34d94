use super::expr::{parse_expr, Expr, ExprError};

pub const OPEN: &str = "{{";
pub const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub source: String,
    pub segments: Vec<Segment>,
}

impl Template {
    /// `"{{ x }}"` and nothing else; such templates keep the JSON type of `x`.
    pub fn as_single_expr(&self) -> Option<&Expr> {
        match self.segments.as_slice() {
            [Segment::Expr(e)] => Some(e),
            _ => None,
        }
    }

    /// Variable names referenced anywhere in the template (built-ins excluded).
    pub fn variable_refs(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Expr(e) => e.variable(),
            Segment::Literal(_) => None,
        })
    }
}

/// Cheap check used by the loader to decide whether a string needs parsing.
pub fn is_templated(input: &str) -> bool {
    input.contains(OPEN)
}

pub fn parse_template(input: &str) -> Result<Template, TemplateError> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        buf.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(TemplateError::UnclosedExpression);
        };
        let inner = after_open[..end].trim();
        if inner.is_empty() {
            return Err(TemplateError::EmptyExpression);
        }
        let expr = parse_expr(inner).map_err(TemplateError::InvalidExpr)?;
        if !buf.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut buf)));
        }
        segments.push(Segment::Expr(expr));
        rest = &after_open[end + CLOSE.len()..];
    }
    buf.push_str(rest);

    if !buf.is_empty() {
        segments.push(Segment::Literal(buf));
    }

    Ok(Template {
        source: input.to_string(),
        segments,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid template expression: {0}")]
    InvalidExpr(#[from] ExprError),
    #[error("unclosed template expression (missing '}}}}')")]
    UnclosedExpression,
    #[error("empty template expression")]
    EmptyExpression,
}
