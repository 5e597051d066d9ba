//! Statement-level parsing of scripts
//!
//! A script is either a single expression (possibly spread over several
//! lines) or a sequence of statements:
//!
//! ```text
//! # comments and blank lines are ignored
//! arrived = event.new_state.state == 'home'
//! was_away = event.old_state.state != 'home'
//! return arrived and was_away
//! ```
//!
//! Statements are `name = <expr>`, a bare `<expr>` evaluated for its side
//! effects, or a final `return <expr>`. A statement continues onto the next
//! line while brackets are open. Expressions themselves are handed to
//! minijinja unchanged.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{ScriptError, ScriptResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Statement {
    Assign { name: String, expr: String, line: usize },
    Expr { expr: String, line: usize },
    Return { expr: String, line: usize },
}

impl Statement {
    pub(crate) fn expr(&self) -> &str {
        match self {
            Statement::Assign { expr, .. }
            | Statement::Expr { expr, .. }
            | Statement::Return { expr, .. } => expr,
        }
    }

    pub(crate) fn line(&self) -> usize {
        match self {
            Statement::Assign { line, .. }
            | Statement::Expr { line, .. }
            | Statement::Return { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Program {
    pub(crate) statements: Vec<Statement>,
}

impl Program {
    /// Resolve a script made only of bare expressions
    ///
    /// When the lines read as one expression spread over several lines,
    /// that expression becomes the return value. Otherwise every line runs
    /// for its side effects and the script returns `none`.
    pub(crate) fn collapse(self, compiles: impl Fn(&str) -> bool) -> Self {
        let bare = self
            .statements
            .iter()
            .all(|s| matches!(s, Statement::Expr { .. }));
        if !bare {
            return self;
        }

        let line = self.statements.first().map_or(1, Statement::line);
        let joined = self
            .statements
            .iter()
            .map(Statement::expr)
            .collect::<Vec<_>>()
            .join(" ");
        if self.statements.len() == 1 || compiles(&joined) {
            return Self {
                statements: vec![Statement::Return { expr: joined, line }],
            };
        }
        self
    }
}

/// `name = expr`, where the `=` is not the start of `==`
static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*([^=].*)$").expect("valid regex")
});

/// Per-line scan result: the code part with any comment removed and the net
/// bracket depth change
fn scan_line(line: &str, line_no: usize, depth: &mut i32) -> ScriptResult<String> {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in line.chars() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '#' => break,
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => *depth += 1,
            ')' | ']' | '}' => {
                *depth -= 1;
                if *depth < 0 {
                    return Err(ScriptError::syntax(format!(
                        "line {}: unmatched '{}'",
                        line_no, c
                    )));
                }
            }
            _ => {}
        }
        out.push(c);
    }

    if quote.is_some() {
        return Err(ScriptError::syntax(format!(
            "line {}: unterminated string literal",
            line_no
        )));
    }
    Ok(out)
}

fn classify(text: String, line: usize) -> Statement {
    if text == "return" {
        return Statement::Return {
            expr: "none".to_string(),
            line,
        };
    }
    if let Some(rest) = text
        .strip_prefix("return")
        .filter(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '('))
    {
        return Statement::Return {
            expr: rest.trim().to_string(),
            line,
        };
    }
    if let Some(caps) = ASSIGNMENT_RE.captures(&text) {
        return Statement::Assign {
            name: caps[1].to_string(),
            expr: caps[2].trim().to_string(),
            line,
        };
    }
    Statement::Expr { expr: text, line }
}

/// Split a script into statements
pub(crate) fn parse(code: &str) -> ScriptResult<Program> {
    let mut statements = Vec::new();
    let mut depth = 0i32;
    let mut pending = String::new();
    let mut pending_line = 0usize;

    for (idx, raw) in code.lines().enumerate() {
        let line_no = idx + 1;
        let code_part = scan_line(raw, line_no, &mut depth)?;
        let trimmed = code_part.trim();
        if trimmed.is_empty() && pending.is_empty() {
            continue;
        }

        if pending.is_empty() {
            pending_line = line_no;
        } else {
            pending.push(' ');
        }
        pending.push_str(trimmed);

        if depth == 0 {
            statements.push(classify(std::mem::take(&mut pending), pending_line));
        }
    }

    if depth != 0 {
        return Err(ScriptError::syntax(format!(
            "line {}: unclosed bracket",
            pending_line
        )));
    }
    if statements.is_empty() {
        return Err(ScriptError::syntax("script is empty"));
    }

    if let Some(pos) = statements
        .iter()
        .position(|s| matches!(s, Statement::Return { .. }))
    {
        if let Some(extra) = statements.get(pos + 1) {
            return Err(ScriptError::syntax(format!(
                "line {}: statement after return",
                extra.line()
            )));
        }
    }

    Ok(Program { statements })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always(_: &str) -> bool {
        true
    }

    fn never(_: &str) -> bool {
        false
    }

    #[test]
    fn test_single_expression_becomes_return() {
        let program = parse("event.new_state.state == 'home'")
            .unwrap()
            .collapse(never);
        assert_eq!(
            program.statements,
            vec![Statement::Return {
                expr: "event.new_state.state == 'home'".to_string(),
                line: 1
            }]
        );
    }

    #[test]
    fn test_expression_over_several_lines() {
        let code = "event.old_state.state != 'home'\n  and event.new_state.state == 'home'\n";
        let program = parse(code).unwrap().collapse(always);
        assert_eq!(program.statements.len(), 1);
        assert!(matches!(&program.statements[0], Statement::Return { line: 1, .. }));
        assert_eq!(
            program.statements[0].expr(),
            "event.old_state.state != 'home' and event.new_state.state == 'home'"
        );
    }

    #[test]
    fn test_assignments_and_return() {
        let code = "# arrival check\n\
                    old = event.old_state.state\n\
                    new = event.new_state.state  # current\n\
                    \n\
                    return old != 'home' and new == 'home'\n";
        let program = parse(code).unwrap();
        assert_eq!(program.statements.len(), 3);
        assert!(matches!(
            &program.statements[0],
            Statement::Assign { name, expr, line: 2 }
                if name == "old" && expr == "event.old_state.state"
        ));
        assert!(matches!(&program.statements[2], Statement::Return { line: 5, .. }));
    }

    #[test]
    fn test_separate_calls_stay_separate() {
        let program = parse("print('a')\nprint('b')").unwrap().collapse(never);
        assert_eq!(
            program.statements,
            vec![
                Statement::Expr {
                    expr: "print('a')".to_string(),
                    line: 1
                },
                Statement::Expr {
                    expr: "print('b')".to_string(),
                    line: 2
                },
            ]
        );
    }

    #[test]
    fn test_collapse_leaves_statement_scripts_alone() {
        let program = parse("x = 1\nx").unwrap();
        assert_eq!(program.clone().collapse(always), program);
    }

    #[test]
    fn test_comparison_is_not_assignment() {
        let program = parse("x = 1\nx == 1\nreturn x").unwrap();
        assert!(matches!(&program.statements[1], Statement::Expr { .. }));
    }

    #[test]
    fn test_brackets_continue_statement() {
        let code = concat!(
            "args = {\n",
            "  'entity': event.entity_id,\n",
            "  'note': '#not a comment'\n",
            "}\n",
            "return args",
        );
        let program = parse(code).unwrap();
        assert_eq!(program.statements.len(), 2);
        assert!(program.statements[0].expr().contains("'#not a comment'"));
    }

    #[test]
    fn test_statement_after_return() {
        let err = parse("return true\nx = 1").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_unbalanced_brackets() {
        assert!(matches!(parse("foo(1"), Err(ScriptError::Syntax { .. })));
        assert!(matches!(parse("foo)"), Err(ScriptError::Syntax { .. })));
        assert!(matches!(parse("'open"), Err(ScriptError::Syntax { .. })));
    }

    #[test]
    fn test_empty_script() {
        assert!(matches!(parse("# nothing\n\n"), Err(ScriptError::Syntax { .. })));
    }
}
