//! CoNLL-U reader.
//!
//! Each sentence is a block of 10-column token lines separated by blank
//! lines. Comment lines start with `#`; a `# text = ...` comment sets the
//! sentence text. Multiword ranges (`1-2`) and empty nodes (`1.1`) are
//! skipped. Columns are tab-separated; lines without tabs are split on
//! whitespace so hand-written fixtures stay readable.

use crate::tree::{ParseTree, Token, TreeError};
use crate::ud::{UdDependency, UdPos};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConlluError {
    #[error("line {line}: expected 10 columns, found {found}")]
    ColumnCount { line: usize, found: usize },
    #[error("line {line}: invalid {column} value `{value}`")]
    InvalidValue {
        line: usize,
        column: &'static str,
        value: String,
    },
    #[error("sentence ending at line {line}: {source}")]
    Tree {
        line: usize,
        #[source]
        source: TreeError,
    },
}

/// Parse every sentence of a CoNLL-U document.
pub fn parse_conllu(input: &str) -> Result<Vec<ParseTree>, ConlluError> {
    let mut sentences = Vec::new();
    let mut tokens = Vec::new();
    let mut text: Option<String> = None;
    let mut last_line = 0;

    for (index, raw) in input.lines().enumerate() {
        let line_no = index + 1;
        last_line = line_no;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            flush(&mut sentences, &mut tokens, &mut text, line_no)?;
            continue;
        }
        if let Some(comment) = line.trim_start().strip_prefix('#') {
            if let Some(value) = comment.trim_start().strip_prefix("text") {
                if let Some(value) = value.trim_start().strip_prefix('=') {
                    text = Some(value.trim().to_string());
                }
            }
            continue;
        }
        if let Some(token) = parse_token_line(line, line_no)? {
            tokens.push(token);
        }
    }
    flush(&mut sentences, &mut tokens, &mut text, last_line)?;
    Ok(sentences)
}

fn flush(
    sentences: &mut Vec<ParseTree>,
    tokens: &mut Vec<Token>,
    text: &mut Option<String>,
    line: usize,
) -> Result<(), ConlluError> {
    if tokens.is_empty() {
        *text = None;
        return Ok(());
    }
    let mut tree =
        ParseTree::new(std::mem::take(tokens)).map_err(|source| ConlluError::Tree { line, source })?;
    if let Some(t) = text.take() {
        tree = tree.with_text(t);
    }
    sentences.push(tree);
    Ok(())
}

fn parse_token_line(line: &str, line_no: usize) -> Result<Option<Token>, ConlluError> {
    let columns: Vec<&str> = if line.contains('\t') {
        line.split('\t').collect()
    } else {
        line.split_whitespace().collect()
    };
    if columns.len() != 10 {
        return Err(ConlluError::ColumnCount {
            line: line_no,
            found: columns.len(),
        });
    }
    let id_field = columns[0];
    if id_field.contains('-') || id_field.contains('.') {
        return Ok(None);
    }
    let invalid = |column: &'static str, value: &str| ConlluError::InvalidValue {
        line: line_no,
        column,
        value: value.to_string(),
    };
    let id: usize = id_field.parse().map_err(|_| invalid("ID", id_field))?;
    let form = columns[1].to_string();
    let lemma = match columns[2] {
        "_" => form.clone(),
        lemma => lemma.to_string(),
    };
    let pos: UdPos = columns[3].parse().map_err(|_| invalid("UPOS", columns[3]))?;
    let head: usize = columns[6].parse().map_err(|_| invalid("HEAD", columns[6]))?;
    let dependency = UdDependency::parse(columns[7]);
    Ok(Some(Token::new(id, form, lemma, pos, head, dependency)))
}
