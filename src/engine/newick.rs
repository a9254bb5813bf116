//! Structural check of the Newick text the computation writes.
//!
//! This is not a parser. It only rejects output that cannot be a complete tree:
//! empty files, unbalanced parentheses, unterminated quoted labels or comments,
//! and a missing final `;`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NewickError {
    #[error("tree is empty")]
    Empty,
    #[error("unbalanced parenthesis at byte {0}")]
    Unbalanced(usize),
    #[error("unterminated quoted label")]
    UnclosedQuote,
    #[error("unterminated comment")]
    UnclosedComment,
    #[error("tree is not terminated by ';'")]
    Unterminated,
}

pub fn validate_newick(text: &str) -> Result<(), NewickError> {
    if text.trim().is_empty() {
        return Err(NewickError::Empty);
    }

    let mut depth = 0usize;
    let mut quoted = false;
    let mut comment = false;
    let mut terminated = false;

    for (at, c) in text.char_indices() {
        if quoted {
            // A doubled quote inside a label reads as close + reopen.
            if c == '\'' {
                quoted = false;
            }
            continue;
        }
        if comment {
            if c == ']' {
                comment = false;
            }
            continue;
        }
        match c {
            '\'' => quoted = true,
            '[' => comment = true,
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or(NewickError::Unbalanced(at))?,
            ';' => {
                if depth != 0 {
                    return Err(NewickError::Unbalanced(at));
                }
                terminated = true;
                continue;
            }
            c if c.is_whitespace() => continue,
            _ => {}
        }
        terminated = false;
    }

    if quoted {
        Err(NewickError::UnclosedQuote)
    } else if comment {
        Err(NewickError::UnclosedComment)
    } else if depth != 0 {
        Err(NewickError::Unbalanced(text.len()))
    } else if !terminated {
        Err(NewickError::Unterminated)
    } else {
        Ok(())
    }
}
