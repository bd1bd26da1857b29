//! Built-in tools
//!
//! Small, side-effect free tools that are handy for trying out a provider.

use async_trait::async_trait;
use serde_json::{Value, json};
use thinkact_core::{
    error::ToolError,
    tool::{ParameterSchema, Tool, ToolSchema},
};
use thiserror::Error;

/// Current date and time
#[derive(Clone, Copy, Debug, Default)]
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("datetime", "Get the current date and time (UTC)").param(
            ParameterSchema::new("format", "string", "Output format: 'iso', 'human', or 'unix'")
                .with_default(json!("human"))
                .with_enum(vec![json!("iso"), json!("human"), json!("unix")]),
        )
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        let format = input
            .get("format")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or("human");

        let now = chrono::Utc::now();
        let output = match format {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            "human" => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "unknown format '{other}', use iso, human or unix"
                )));
            }
        };

        Ok(json!(output))
    }
}

/// Arithmetic over `+ - * / ^` and parentheses
#[derive(Clone, Copy, Debug, Default)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("calculate", "Evaluate a mathematical expression").param(
            ParameterSchema::new(
                "expression",
                "string",
                "Mathematical expression to evaluate (e.g., '2 + 2', '(10 - 4) * 5')",
            )
            .required(),
        )
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        let expr = input
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidInput("expression must be a string".into()))?;

        let result = evaluate(expr).map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        Ok(json!(format!("{} = {result}", expr.trim())))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CalcError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unbalanced parentheses")]
    Unbalanced,
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let tokens: Vec<char> = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parser = Calc { tokens, pos: 0 };
    let value = parser.sum()?;
    match parser.peek() {
        None => Ok(value),
        Some(')') => Err(CalcError::Unbalanced),
        Some(c) => Err(CalcError::UnexpectedChar(c)),
    }
}

struct Calc {
    tokens: Vec<char>,
    pos: usize,
}

impl Calc {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn sum(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.product()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    fn product(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.power()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.power()?;
            if op == '/' {
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                acc /= rhs;
            } else {
                acc *= rhs;
            }
        }
        Ok(acc)
    }

    // right-associative
    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.unary()?;
        if self.peek() == Some('^') {
            self.pos += 1;
            let exp = self.power()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.sum()?;
                if self.peek() != Some(')') {
                    return Err(CalcError::Unbalanced);
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '.')
                {
                    self.pos += 1;
                }
                let literal: String = self.tokens[start..self.pos].iter().collect();
                literal
                    .parse()
                    .map_err(|_| CalcError::InvalidNumber(literal))
            }
            Some(c) => Err(CalcError::UnexpectedChar(c)),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("2 * -3").unwrap(), -6.0);
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("(1 + 2"), Err(CalcError::Unbalanced));
        assert_eq!(evaluate("1 + 2)"), Err(CalcError::Unbalanced));
        assert_eq!(evaluate("2 +"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("two"), Err(CalcError::UnexpectedChar('t')));
    }

    #[tokio::test]
    async fn test_calculator_tool() {
        let out = CalculatorTool
            .invoke(json!({"expression": "6 * 7"}))
            .await
            .unwrap();
        assert_eq!(out, json!("6 * 7 = 42"));

        let err = CalculatorTool
            .invoke(json!({"expression": "6 *"}))
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_datetime_formats() {
        let unix = DateTimeTool.invoke(json!({"format": "unix"})).await.unwrap();
        assert!(unix.as_str().unwrap().parse::<i64>().is_ok());

        let human = DateTimeTool.invoke(json!({"format": ""})).await.unwrap();
        assert!(human.as_str().unwrap().ends_with("UTC"));

        assert!(DateTimeTool.invoke(json!({"format": "roman"})).await.is_err());
    }
}
