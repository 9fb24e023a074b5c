//! Custom-property parser
//!
//! Single pass over theme CSS. Accepts comments, rule blocks
//! (`selector { ... }`) and bare declaration lists. Only `--name: value`
//! declarations are returned; other declarations must still be well formed.
//! Anything malformed rejects the whole text.

use crate::core::{CoreError, CoreResult};

/// One `--name: value [!important]` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn new(name: &str, value: &str, important: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            important,
        }
    }
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn error(&self, message: &str) -> CoreError {
        CoreError::ValidationError(format!("Invalid theme CSS at byte {}: {}", self.pos, message))
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    /// Skips whitespace and comments
    fn skip_trivia(&mut self) -> CoreResult<()> {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            }
            if !self.starts_with("/*") {
                return Ok(());
            }
            match self.src[self.pos + 2..].find("*/") {
                Some(end) => self.pos += 2 + end + 2,
                None => return Err(self.error("unterminated comment")),
            }
        }
    }

    /// Reads up to (not including) one of `stops` at paren depth zero,
    /// honouring quoted strings.
    fn read_until(&mut self, stops: &[char]) -> CoreResult<&'a str> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        while let Some(c) = self.peek() {
            match (quote, c) {
                (Some(_), '\\') => {
                    self.bump();
                }
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| self.error("unbalanced ')'"))?;
                }
                (None, c) if depth == 0 && stops.contains(&c) => break,
                (None, '{' | '}') => return Err(self.error("unexpected brace in value")),
                _ => {}
            }
            self.bump();
        }
        if quote.is_some() {
            return Err(self.error("unterminated string"));
        }
        if depth != 0 {
            return Err(self.error("unbalanced '('"));
        }
        Ok(&self.src[start..self.pos])
    }
}

fn valid_property_name(name: &str) -> bool {
    let is_name_char = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii();
    !name.is_empty() && name.chars().all(is_name_char)
}

/// Parses one declaration list up to `}` (inside a block) or end of input.
fn parse_declarations(
    scanner: &mut Scanner<'_>,
    in_block: bool,
    out: &mut Vec<Declaration>,
) -> CoreResult<()> {
    loop {
        scanner.skip_trivia()?;
        match scanner.peek() {
            None if in_block => return Err(scanner.error("unterminated block")),
            None => return Ok(()),
            Some('}') if in_block => {
                scanner.bump();
                return Ok(());
            }
            Some(';') => {
                scanner.bump();
                continue;
            }
            _ => {}
        }

        let name = scanner.read_until(&[':', ';', '}'])?.trim();
        if scanner.bump() != Some(':') {
            return Err(scanner.error("expected ':' after property name"));
        }
        let raw = scanner.read_until(&[';', '}'])?;
        let mut value = raw.trim();
        let mut important = false;
        if let Some(idx) = value.rfind('!') {
            if value[idx + 1..].trim().eq_ignore_ascii_case("important") {
                important = true;
                value = value[..idx].trim_end();
            }
        }

        if let Some(custom) = name.strip_prefix("--") {
            if !valid_property_name(custom) {
                return Err(scanner.error(&format!("invalid custom property name '{name}'")));
            }
            if value.is_empty() {
                return Err(scanner.error(&format!("empty value for '{name}'")));
            }
            out.push(Declaration::new(name, value, important));
        } else if name.is_empty() || !valid_property_name(name) {
            return Err(scanner.error(&format!("invalid property name '{name}'")));
        }
    }
}

/// Extracts every custom property from theme CSS.
pub fn parse_custom_properties(css: &str) -> CoreResult<Vec<Declaration>> {
    let mut scanner = Scanner { src: css, pos: 0 };
    let mut out = Vec::new();
    let mut seen_block = false;

    loop {
        scanner.skip_trivia()?;
        if scanner.peek().is_none() {
            return Ok(out);
        }

        let start = scanner.pos;
        let head = scanner.read_until(&['{', ';', '}'])?;
        match scanner.peek() {
            Some('{') => {
                if head.trim().is_empty() {
                    return Err(scanner.error("block without selector"));
                }
                scanner.bump();
                parse_declarations(&mut scanner, true, &mut out)?;
                seen_block = true;
            }
            Some('}') => return Err(scanner.error("unexpected '}'")),
            _ if seen_block => return Err(scanner.error("declarations mixed with blocks")),
            _ => {
                scanner.pos = start;
                parse_declarations(&mut scanner, false, &mut out)?;
                return Ok(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_root_block() {
        let css = r#"
            /* Monokai */
            :root {
                --bg-primary: #272822;
                --accent: rgb(249, 38, 114) !important;
                color: red;
                --font: "Fira Code; mono", monospace
            }
        "#;
        let decls = parse_custom_properties(css).unwrap();
        assert_eq!(
            decls,
            vec![
                Declaration::new("--bg-primary", "#272822", false),
                Declaration::new("--accent", "rgb(249, 38, 114)", true),
                Declaration::new("--font", "\"Fira Code; mono\", monospace", false),
            ]
        );
    }

    #[test]
    fn test_bare_declaration_list() {
        let decls = parse_custom_properties("--a: 1px; --b: 2px !IMPORTANT;").unwrap();
        assert_eq!(decls.len(), 2);
        assert!(decls[1].important);
        assert_eq!(decls[1].value, "2px");
    }

    #[test]
    fn test_multiple_blocks_and_empty_input() {
        let css = ":root { --a: 1; } body.dark { --b: 2; }";
        assert_eq!(parse_custom_properties(css).unwrap().len(), 2);
        assert!(parse_custom_properties("  /* nothing */ ").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_malformed_input() {
        for css in [
            ":root { --a: 1;",
            ":root { --a 1; }",
            ":root { --: 1; }",
            ":root { --a: ; }",
            ":root { --a: calc(1px; }",
            "/* open",
            "--a: 1; :root { --b: 2; }",
            "}",
            "{ --a: 1; }",
            ":root { --a$: 1; }",
            ":root { --a: \"open; }",
        ] {
            let err = parse_custom_properties(css).unwrap_err();
            assert!(err.is_validation(), "{css:?} should be rejected");
        }
    }
}
