//! Template parsing: literal text plus `{{ ... }}` actions.
//!
//! Supported actions: `.dotted.path` lookups (`.` alone is the current
//! scope), string/number/bool literals, function calls `fn arg1 arg2` with
//! parenthesized sub-expressions, `{{if expr}}...{{else}}...{{end}}`, and
//! `{{range expr}}...{{end}}` (the dot rebinds to each element).

use crate::error::TemplateError;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Dotted path into the current scope; empty path is the scope itself.
    Path(Vec<String>),
    Call { name: String, args: Vec<Expr> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Text(String),
    Action(Expr),
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        expr: Expr,
        body: Vec<Node>,
    },
}

/// Parse a full template into a node list.
pub fn parse(input: &str) -> Result<Vec<Node>, TemplateError> {
    let mut blocks = parse_blocks(input)?;
    let (nodes, terminator) = build_nodes(&mut blocks)?;
    if let Some(t) = terminator {
        return Err(TemplateError::Parse(format!("unexpected {{{{{}}}}}", t)));
    }
    Ok(nodes)
}

/// Raw segmentation of the input into text and action chunks.
enum Block {
    Text(String),
    Action(String),
}

fn parse_blocks(input: &str) -> Result<Vec<Block>, TemplateError> {
    let mut blocks = Vec::new();
    let mut rest = input;
    loop {
        match rest.find("{{") {
            None => {
                if !rest.is_empty() {
                    blocks.push(Block::Text(rest.to_string()));
                }
                return Ok(blocks);
            }
            Some(start) => {
                if start > 0 {
                    blocks.push(Block::Text(rest[..start].to_string()));
                }
                let after = &rest[start + 2..];
                let end = after
                    .find("}}")
                    .ok_or_else(|| TemplateError::Parse("unclosed {{".into()))?;
                blocks.push(Block::Action(after[..end].trim().to_string()));
                rest = &after[end + 2..];
            }
        }
    }
}

/// Assemble the block stream into a tree. Returns the nodes up to (and the
/// name of) the `else`/`end` terminator that closed them, if any.
fn build_nodes(blocks: &mut Vec<Block>) -> Result<(Vec<Node>, Option<String>), TemplateError> {
    let mut nodes = Vec::new();
    while !blocks.is_empty() {
        let block = blocks.remove(0);
        match block {
            Block::Text(t) => nodes.push(Node::Text(t)),
            Block::Action(action) => {
                let (head, tail) = split_keyword(&action);
                match head {
                    "end" | "else" => return Ok((nodes, Some(head.to_string()))),
                    "if" => {
                        let cond = parse_expr(tail)?;
                        let (then, terminator) = build_nodes(blocks)?;
                        let otherwise = match terminator.as_deref() {
                            Some("else") => {
                                let (otherwise, terminator) = build_nodes(blocks)?;
                                if terminator.as_deref() != Some("end") {
                                    return Err(TemplateError::Parse(
                                        "if without matching end".into(),
                                    ));
                                }
                                otherwise
                            }
                            Some("end") => Vec::new(),
                            _ => {
                                return Err(TemplateError::Parse("if without matching end".into()))
                            }
                        };
                        nodes.push(Node::If {
                            cond,
                            then,
                            otherwise,
                        });
                    }
                    "range" => {
                        let expr = parse_expr(tail)?;
                        let (body, terminator) = build_nodes(blocks)?;
                        if terminator.as_deref() != Some("end") {
                            return Err(TemplateError::Parse("range without matching end".into()));
                        }
                        nodes.push(Node::Range { expr, body });
                    }
                    _ => nodes.push(Node::Action(parse_expr(&action)?)),
                }
            }
        }
    }
    Ok((nodes, None))
}

fn split_keyword(action: &str) -> (&str, &str) {
    match action.find(char::is_whitespace) {
        Some(i) => (&action[..i], action[i..].trim_start()),
        None => (action, ""),
    }
}

/// Expression tokens.
#[derive(Clone, Debug, PartialEq)]
enum Token {
    Path(Vec<String>),
    Ident(String),
    Literal(Value),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    if i >= chars.len() {
                        return Err(TemplateError::Parse("unclosed string literal".into()));
                    }
                    match chars[i] {
                        '"' => {
                            i += 1;
                            break;
                        }
                        '\\' => {
                            i += 1;
                            if i >= chars.len() {
                                return Err(TemplateError::Parse("unclosed string literal".into()));
                            }
                            s.push(match chars[i] {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                            i += 1;
                        }
                        other => {
                            s.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::String(s)));
            }
            '.' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let path: String = chars[start..i].iter().collect();
                let segments: Vec<String> = path
                    .split('.')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                tokens.push(Token::Path(segments));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = if text.contains('.') {
                    text.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                } else {
                    text.parse::<i64>().map(|n| Value::Number(n.into())).ok()
                };
                match value {
                    Some(v) => tokens.push(Token::Literal(v)),
                    None => return Err(TemplateError::Parse(format!("bad number: {}", text))),
                }
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "true" => tokens.push(Token::Literal(Value::Bool(true))),
                    "false" => tokens.push(Token::Literal(Value::Bool(false))),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => {
                return Err(TemplateError::Parse(format!(
                    "unexpected character: {}",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

/// Parse one expression. A leading identifier starts a function call whose
/// arguments run to the end of the action (or the closing paren).
pub fn parse_expr(input: &str) -> Result<Expr, TemplateError> {
    let mut tokens = tokenize(input)?;
    let expr = parse_tokens(&mut tokens, true)?;
    if !tokens.is_empty() {
        return Err(TemplateError::Parse(format!(
            "trailing tokens in expression: {}",
            input
        )));
    }
    Ok(expr)
}

fn parse_tokens(tokens: &mut Vec<Token>, call_position: bool) -> Result<Expr, TemplateError> {
    if tokens.is_empty() {
        return Err(TemplateError::Parse("empty expression".into()));
    }
    let token = tokens.remove(0);
    match token {
        Token::Literal(v) => Ok(Expr::Literal(v)),
        Token::Path(p) => Ok(Expr::Path(p)),
        Token::LParen => {
            let inner = parse_tokens(tokens, true)?;
            match tokens.first() {
                Some(Token::RParen) => {
                    tokens.remove(0);
                    Ok(inner)
                }
                _ => Err(TemplateError::Parse("missing closing paren".into())),
            }
        }
        Token::RParen => Err(TemplateError::Parse("unexpected closing paren".into())),
        Token::Ident(name) => {
            if !call_position {
                return Ok(Expr::Call {
                    name,
                    args: Vec::new(),
                });
            }
            let mut args = Vec::new();
            while let Some(next) = tokens.first() {
                if *next == Token::RParen {
                    break;
                }
                args.push(parse_tokens(tokens, false)?);
            }
            Ok(Expr::Call { name, args })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_is_one_node() {
        let nodes = parse("just text").unwrap();
        assert_eq!(nodes, vec![Node::Text("just text".into())]);
    }

    #[test]
    fn variable_action() {
        let nodes = parse("Hello {{.name}}").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Text("Hello ".into()),
                Node::Action(Expr::Path(vec!["name".into()])),
            ]
        );
    }

    #[test]
    fn bare_dot_is_the_empty_path() {
        let nodes = parse("{{.}}").unwrap();
        assert_eq!(nodes, vec![Node::Action(Expr::Path(vec![]))]);
    }

    #[test]
    fn call_with_mixed_arguments() {
        let nodes = parse(r#"{{multi "templates" "q[name]=base"}}"#).unwrap();
        assert_eq!(
            nodes,
            vec![Node::Action(Expr::Call {
                name: "multi".into(),
                args: vec![
                    Expr::Literal(json!("templates")),
                    Expr::Literal(json!("q[name]=base")),
                ],
            })]
        );
    }

    #[test]
    fn nested_calls_need_parens() {
        let nodes = parse("{{add 1 (mul 2 3)}}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Action(Expr::Call {
                name: "add".into(),
                args: vec![
                    Expr::Literal(json!(1)),
                    Expr::Call {
                        name: "mul".into(),
                        args: vec![Expr::Literal(json!(2)), Expr::Literal(json!(3))],
                    },
                ],
            })]
        );
    }

    #[test]
    fn if_else_end_nest() {
        let nodes = parse("{{if .ok}}yes{{else}}no{{end}}").unwrap();
        match &nodes[0] {
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                assert_eq!(*cond, Expr::Path(vec!["ok".into()]));
                assert_eq!(*then, vec![Node::Text("yes".into())]);
                assert_eq!(*otherwise, vec![Node::Text("no".into())]);
            }
            other => panic!("expected if node, got {:?}", other),
        }
    }

    #[test]
    fn range_binds_body() {
        let nodes = parse("{{range .items}}<{{.name}}>{{end}}").unwrap();
        match &nodes[0] {
            Node::Range { expr, body } => {
                assert_eq!(*expr, Expr::Path(vec!["items".into()]));
                assert_eq!(body.len(), 3);
            }
            other => panic!("expected range node, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_constructs_fail() {
        assert!(parse("{{if .ok}}yes").is_err());
        assert!(parse("{{range .xs}}y").is_err());
        assert!(parse("{{end}}").is_err());
        assert!(parse("{{.name").is_err());
        assert!(parse(r#"{{split "a,b}}"#).is_err());
    }
}
