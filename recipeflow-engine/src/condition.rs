//! ABOUTME: Evaluator for conditional step expressions
//! ABOUTME: Hand-written lexer and recursive-descent parser, no general expression language

use recipeflow_core::{RecipeError, Result};
use std::path::Path;

/// Evaluate a fully-rendered condition expression to a boolean.
///
/// Supported grammar, and nothing more:
/// - literals: `true`/`false` (any case), numbers, quoted or bare strings
/// - comparisons: `==  !=  <  <=  >  >=` (numeric when both sides parse as
///   numbers, lexicographic otherwise)
/// - functions: `and(a, b)`, `or(a, b)`, `not(x)`, `file_exists(path)`
///
/// The string results `"true"`/`"false"` coerce to booleans, which is how
/// template-substituted conditions like `{{ done }}` resolve.
///
/// # Errors
///
/// Returns `RecipeError::Condition` on lexical or grammatical errors, on
/// unknown functions, and when the expression does not reduce to a boolean.
pub fn evaluate(expression: &str) -> Result<bool> {
    let tokens = lex(expression).map_err(|message| RecipeError::Condition {
        expression: expression.to_string(),
        message,
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr().map_err(|message| RecipeError::Condition {
        expression: expression.to_string(),
        message,
    })?;
    if parser.pos != parser.tokens.len() {
        return Err(RecipeError::Condition {
            expression: expression.to_string(),
            message: format!("unexpected trailing input at token {}", parser.pos),
        });
    }
    value.to_bool().map_err(|message| RecipeError::Condition {
        expression: expression.to_string(),
        message,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Cmp(CmpOp),
    /// Bare or quoted text; `quoted` distinguishes `"true"` from `true`.
    Atom { text: String, quoted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum CondValue {
    Bool(bool),
    Text(String),
}

impl CondValue {
    fn to_bool(&self) -> std::result::Result<bool, String> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Text(t) => match t.trim().to_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(format!("'{other}' is not a boolean")),
            },
        }
    }

    fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Text(t) => t.clone(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Bool(_) => None,
            Self::Text(t) => t.trim().parse().ok(),
        }
    }
}

fn lex(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err("expected '==' (single '=' is not an operator)".to_string());
                }
                tokens.push(Token::Cmp(CmpOp::Eq));
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err("expected '!=' after '!'".to_string());
                }
                tokens.push(Token::Cmp(CmpOp::Ne));
            }
            '<' => {
                chars.next();
                let op = if chars.next_if_eq(&'=').is_some() {
                    CmpOp::Le
                } else {
                    CmpOp::Lt
                };
                tokens.push(Token::Cmp(op));
            }
            '>' => {
                chars.next();
                let op = if chars.next_if_eq(&'=').is_some() {
                    CmpOp::Ge
                } else {
                    CmpOp::Gt
                };
                tokens.push(Token::Cmp(op));
            }
            quote @ ('\'' | '"') => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => text.push(c),
                        None => return Err(format!("unterminated string starting with {quote}")),
                    }
                }
                tokens.push(Token::Atom { text, quoted: true });
            }
            _ => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || "(),<>=!'\"".contains(c) {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                tokens.push(Token::Atom {
                    text,
                    quoted: false,
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// expr := operand [ cmp_op operand ]
    fn expr(&mut self) -> std::result::Result<CondValue, String> {
        let left = self.operand()?;
        let Some(Token::Cmp(op)) = self.peek().cloned() else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.operand()?;
        Ok(CondValue::Bool(compare(op, &left, &right)))
    }

    /// operand := call | literal
    fn operand(&mut self) -> std::result::Result<CondValue, String> {
        match self.next() {
            Some(Token::Atom { text, quoted }) => {
                if !quoted && self.peek() == Some(&Token::LParen) {
                    return self.call(&text);
                }
                if !quoted {
                    match text.to_lowercase().as_str() {
                        "true" => return Ok(CondValue::Bool(true)),
                        "false" => return Ok(CondValue::Bool(false)),
                        _ => {}
                    }
                }
                Ok(CondValue::Text(text))
            }
            Some(other) => Err(format!("expected a value, found {other:?}")),
            None => Err("expected a value, found end of input".to_string()),
        }
    }

    fn call(&mut self, name: &str) -> std::result::Result<CondValue, String> {
        self.pos += 1; // consume '('
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.expr()?);
                match self.next() {
                    Some(Token::Comma) => {}
                    Some(Token::RParen) => break,
                    other => return Err(format!("expected ',' or ')' in {name}(), found {other:?}")),
                }
            }
        } else {
            self.pos += 1;
        }

        match name {
            "and" => {
                let [a, b] = two_args(name, args)?;
                Ok(CondValue::Bool(a.to_bool()? && b.to_bool()?))
            }
            "or" => {
                let [a, b] = two_args(name, args)?;
                Ok(CondValue::Bool(a.to_bool()? || b.to_bool()?))
            }
            "not" => {
                let [x] = one_arg(name, args)?;
                Ok(CondValue::Bool(!x.to_bool()?))
            }
            "file_exists" => {
                let [p] = one_arg(name, args)?;
                Ok(CondValue::Bool(Path::new(&p.as_text()).exists()))
            }
            other => Err(format!("unknown function '{other}'")),
        }
    }
}

fn one_arg(name: &str, args: Vec<CondValue>) -> std::result::Result<[CondValue; 1], String> {
    <[CondValue; 1]>::try_from(args).map_err(|got| {
        format!("{name}() expects one argument, got {}", got.len())
    })
}

fn two_args(name: &str, args: Vec<CondValue>) -> std::result::Result<[CondValue; 2], String> {
    <[CondValue; 2]>::try_from(args).map_err(|got| {
        format!("{name}() expects two arguments, got {}", got.len())
    })
}

fn compare(op: CmpOp, left: &CondValue, right: &CondValue) -> bool {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return match op {
            CmpOp::Eq => (a - b).abs() < f64::EPSILON,
            CmpOp::Ne => (a - b).abs() >= f64::EPSILON,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
    }
    let (a, b) = (left.as_text(), right.as_text());
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_literals_and_coercion() {
        assert!(evaluate("true").unwrap());
        assert!(!evaluate("false").unwrap());
        assert!(evaluate("TRUE").unwrap());
        assert!(evaluate("'true'").unwrap());
        assert!(!evaluate("\"False\"").unwrap());
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(evaluate("10 == 10").unwrap());
        assert!(evaluate("10 >= 9.5").unwrap());
        assert!(evaluate("2 < 10").unwrap());
        // Numeric compare, not lexicographic: "2" < "10" holds numerically.
        assert!(!evaluate("2 > 10").unwrap());
        assert!(evaluate("1 != 2").unwrap());
    }

    #[test]
    fn test_string_comparisons() {
        assert!(evaluate("abc == abc").unwrap());
        assert!(evaluate("'hello world' != 'hello'").unwrap());
        assert!(evaluate("apple < banana").unwrap());
    }

    #[test]
    fn test_logical_functions() {
        assert!(evaluate("and(true, true)").unwrap());
        assert!(!evaluate("and(true, false)").unwrap());
        assert!(evaluate("or(false, true)").unwrap());
        assert!(evaluate("not(false)").unwrap());
        assert!(evaluate("and(1 < 2, not(or(false, false)))").unwrap());
    }

    #[test]
    fn test_file_exists() {
        assert!(!evaluate("file_exists('/definitely/not/here.txt')").unwrap());
        assert!(evaluate("file_exists('/')").unwrap());
        assert!(evaluate("not(file_exists('/definitely/not/here.txt'))").unwrap());
    }

    #[test]
    fn test_arity_errors() {
        assert!(evaluate("and(true)").is_err());
        assert!(evaluate("not(true, false)").is_err());
        assert!(evaluate("file_exists()").is_err());
    }

    #[test]
    fn test_rejects_unknown_functions_and_garbage() {
        assert!(matches!(
            evaluate("shell('rm -rf /')").unwrap_err(),
            RecipeError::Condition { .. }
        ));
        assert!(evaluate("1 ==").is_err());
        assert!(evaluate("= 1").is_err());
        assert!(evaluate("true false").is_err());
        assert!(evaluate("'unterminated").is_err());
    }

    #[test]
    fn test_non_boolean_result_is_error() {
        let err = evaluate("hello").unwrap_err();
        assert!(matches!(err, RecipeError::Condition { .. }));
    }
}
