//! Source-rewriting tooling: edit lists, import suggestions, application.
//!
//! Three versioned JSON document shapes (v1), each stamped with its
//! `$schema` URL. Serialization goes through serde with declaration-order
//! fields, so emitted documents are byte-stable across runs.
//!
//! `normalize` turns a bare fragment into a valid module by emitting
//! edits (add the `module` header, `export`, a return type, an effect
//! row); `suggest-imports` resolves unresolved identifiers against the
//! standard library; `apply` replays edit lists bottom-up so earlier line
//! numbers stay valid while later lines change.

use ailang_common::{Code, Diagnostic};
use ailang_rt::registry;
use ailang_syntax::lexer::lex;
use ailang_syntax::parse_module;
use ailang_syntax::token::TokenKind;
use serde::{Deserialize, Serialize};

pub const EDIT_LIST_SCHEMA: &str = "https://ailang.dev/schemas/v1/edit-list.json";
pub const IMPORTS_SCHEMA: &str = "https://ailang.dev/schemas/v1/import-suggestions.json";
pub const APPLY_RESULT_SCHEMA: &str = "https://ailang.dev/schemas/v1/apply-result.json";

// ── Document shapes (v1) ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditList {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub edits: Vec<Edit>,
}

/// One edit. `line` is 1-based; `prepend` inserts before it, `append`
/// inserts after the last line when `line` is 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edit {
    #[serde(rename = "type")]
    pub kind: EditKind,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Prepend,
    Append,
    Modify,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSuggestions {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub imports: Vec<ImportSuggestion>,
    /// Where new import lines belong (after the `module` header and any
    /// existing imports), 1-based.
    pub insert_after_line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSuggestion {
    pub module: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub applied: usize,
    /// `"ok"` when the rewritten source parses, `"parse_errors"` when it
    /// does not.
    pub validation: String,
}

// ── normalize ───────────────────────────────────────────────────────────

/// Known std/io operation names, used to guess a missing `! {IO}` row.
const IO_OPERATIONS: &[&str] = &["println", "print", "readLine"];

/// Compute the edits that wrap a fragment into a valid module.
pub fn normalize(source: &str) -> EditList {
    let mut edits = Vec::new();
    let lines: Vec<&str> = source.lines().collect();

    let has_module_header = lines
        .iter()
        .any(|line| line.trim_start().starts_with("module "));
    if !has_module_header {
        edits.push(Edit {
            kind: EditKind::Prepend,
            line: 1,
            text: Some("module scratch/main".to_string()),
            old: None,
            new: None,
        });
    }

    let uses_io = IO_OPERATIONS
        .iter()
        .any(|op| source.contains(&format!("{}(", op)));

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with("func ") && !trimmed.starts_with("export func ") {
            continue;
        }
        let mut rewritten = line.to_string();
        if trimmed.starts_with("func ") {
            let indent = &line[..line.len() - trimmed.len()];
            rewritten = format!("{}export {}", indent, trimmed);
        }
        if !rewritten.contains("->") {
            // Insert `-> ()` ahead of the body marker.
            let insert_at = rewritten
                .find('=')
                .or_else(|| rewritten.find('{'))
                .unwrap_or(rewritten.len());
            let (head, tail) = rewritten.split_at(insert_at);
            rewritten = format!("{}-> () {}", head.trim_end().to_string() + " ", tail);
        }
        if uses_io && !rewritten.contains('!') {
            if let Some(arrow) = rewritten.find("->") {
                let after_arrow = &rewritten[arrow..];
                let body_marker = after_arrow
                    .find('=')
                    .or_else(|| after_arrow.find('{'))
                    .map(|i| arrow + i)
                    .unwrap_or(rewritten.len());
                let (head, tail) = rewritten.split_at(body_marker);
                rewritten = format!("{}! {{IO}} {}", head.trim_end().to_string() + " ", tail);
            }
        }
        if rewritten != *line {
            edits.push(Edit {
                kind: EditKind::Modify,
                line: idx + 1,
                text: None,
                old: Some((*line).to_string()),
                new: Some(rewritten),
            });
        }
    }

    EditList {
        schema: EDIT_LIST_SCHEMA.to_string(),
        edits,
    }
}

// ── suggest-imports ─────────────────────────────────────────────────────

/// Resolve identifiers against the standard library's surface exports and
/// suggest the imports that would bind them. Prelude names need no import
/// and are never suggested.
pub fn suggest_imports(source: &str) -> ImportSuggestions {
    // Map surface name → std module, from the registry.
    let mut std_names: Vec<(&'static str, &'static str)> = Vec::new();
    for spec in registry().specs() {
        if let Some(surface) = spec.surface_name {
            if spec.module != "std/prelude" {
                std_names.push((surface, spec.module));
            }
        }
    }

    // Names already bound: imported names plus declared functions.
    let mut bound: Vec<String> = Vec::new();
    let mut insert_after_line = 1;
    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("module ") {
            insert_after_line = idx + 1;
        }
        if let Some(rest) = trimmed.strip_prefix("import ") {
            insert_after_line = idx + 1;
            if let Some(open) = rest.find('(') {
                let inner = rest[open + 1..].trim_end().trim_end_matches(')');
                for name in inner.split(',') {
                    bound.push(name.trim().to_string());
                }
            }
        }
        if let Some(rest) = trimmed
            .strip_prefix("export func ")
            .or_else(|| trimmed.strip_prefix("func "))
        {
            if let Some(name) = rest.split(['(', '[']).next() {
                bound.push(name.trim().to_string());
            }
        }
    }

    // Identifier occurrences, lexed rather than substring-matched.
    let tokens = lex(source);
    let mut suggestions: Vec<ImportSuggestion> = Vec::new();
    for token in &tokens.tokens {
        if token.kind != TokenKind::Ident {
            continue;
        }
        let text = &source[token.span.start as usize..token.span.end as usize];
        let Some((_, module)) = std_names.iter().find(|(name, _)| *name == text) else {
            continue;
        };
        if bound.iter().any(|b| b == text) {
            continue;
        }
        match suggestions.iter_mut().find(|s| s.module == *module) {
            Some(entry) => {
                if !entry.symbols.iter().any(|s| s == text) {
                    entry.symbols.push(text.to_string());
                }
            }
            None => suggestions.push(ImportSuggestion {
                module: module.to_string(),
                symbols: vec![text.to_string()],
            }),
        }
    }
    suggestions.sort_by(|a, b| a.module.cmp(&b.module));
    for suggestion in &mut suggestions {
        suggestion.symbols.sort();
    }

    ImportSuggestions {
        schema: IMPORTS_SCHEMA.to_string(),
        imports: suggestions,
        insert_after_line,
    }
}

// ── apply ───────────────────────────────────────────────────────────────

/// Apply edit lists to a source text, bottom-up, then re-validate.
pub fn apply(source: &str, lists: &[EditList]) -> Result<(String, ApplyResult), Diagnostic> {
    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
    let mut applied = 0usize;

    // All line numbers refer to the original file. Bottom-up replay keeps
    // them valid: in-place changes first (highest line first), then
    // insertions (highest line first), so nothing shifts under an edit
    // that still needs its original coordinates.
    let mut changes: Vec<&Edit> = Vec::new();
    let mut inserts: Vec<&Edit> = Vec::new();
    for edit in lists.iter().flat_map(|l| l.edits.iter()) {
        match edit.kind {
            EditKind::Modify | EditKind::Delete => changes.push(edit),
            EditKind::Prepend | EditKind::Append => inserts.push(edit),
        }
    }
    changes.sort_by(|a, b| b.line.cmp(&a.line));
    inserts.sort_by(|a, b| b.line.cmp(&a.line));

    for edit in changes.into_iter().chain(inserts) {
        match edit.kind {
            EditKind::Prepend => {
                let text = edit.text.clone().ok_or_else(|| bad_edit("prepend needs `text`"))?;
                let at = edit.line.saturating_sub(1).min(lines.len());
                lines.insert(at, text);
            }
            EditKind::Append => {
                let text = edit.text.clone().ok_or_else(|| bad_edit("append needs `text`"))?;
                let at = if edit.line == 0 {
                    lines.len()
                } else {
                    edit.line.min(lines.len())
                };
                lines.insert(at, text);
            }
            EditKind::Modify => {
                let new = edit.new.clone().ok_or_else(|| bad_edit("modify needs `new`"))?;
                let idx = edit
                    .line
                    .checked_sub(1)
                    .filter(|&i| i < lines.len())
                    .ok_or_else(|| bad_edit("modify line out of range"))?;
                if let Some(old) = &edit.old {
                    if &lines[idx] != old {
                        return Err(bad_edit(&format!(
                            "modify at line {}: expected {:?}, found {:?}",
                            edit.line, old, lines[idx]
                        )));
                    }
                }
                lines[idx] = new;
            }
            EditKind::Delete => {
                let idx = edit
                    .line
                    .checked_sub(1)
                    .filter(|&i| i < lines.len())
                    .ok_or_else(|| bad_edit("delete line out of range"))?;
                lines.remove(idx);
            }
        }
        applied += 1;
    }

    let rewritten = if lines.is_empty() {
        String::new()
    } else {
        format!("{}\n", lines.join("\n"))
    };
    let parsed = parse_module(&rewritten);
    let validation = if parsed.errors.is_empty() && parsed.module.is_some() {
        "ok"
    } else {
        "parse_errors"
    };
    Ok((
        rewritten,
        ApplyResult {
            schema: APPLY_RESULT_SCHEMA.to_string(),
            applied,
            validation: validation.to_string(),
        },
    ))
}

fn bad_edit(message: &str) -> Diagnostic {
    Diagnostic::new(Code::JsonDecode, format!("invalid edit: {}", message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_module_header_and_export() {
        let fragment = "func add(a: Int, b: Int) -> Int = a + b";
        let list = normalize(fragment);
        assert_eq!(list.schema, EDIT_LIST_SCHEMA);
        assert!(matches!(list.edits[0].kind, EditKind::Prepend));
        assert_eq!(list.edits[0].text.as_deref(), Some("module scratch/main"));
        let modify = &list.edits[1];
        assert!(matches!(modify.kind, EditKind::Modify));
        assert!(modify.new.as_deref().unwrap().starts_with("export func add"));
    }

    #[test]
    fn normalize_infers_an_io_effect_row() {
        let fragment = "func main() -> () { println(\"hi\") }";
        let list = normalize(fragment);
        let modify = list
            .edits
            .iter()
            .find(|e| matches!(e.kind, EditKind::Modify))
            .expect("a modify edit");
        assert!(modify.new.as_deref().unwrap().contains("! {IO}"));
    }

    #[test]
    fn normalize_leaves_valid_modules_alone() {
        let valid = "module t/m\nexport func main() -> () = ()";
        let list = normalize(valid);
        assert!(list.edits.is_empty());
    }

    #[test]
    fn normalize_then_apply_yields_a_parsing_module() {
        let fragment = "func main() -> () { println(\"hi\") }";
        let list = normalize(fragment);
        let (rewritten, result) = apply(fragment, &[list]).unwrap();
        assert_eq!(result.validation, "ok");
        assert!(rewritten.starts_with("module scratch/main\n"));
        assert!(rewritten.contains("export func main() -> () ! {IO} {"));
    }

    #[test]
    fn suggest_imports_groups_by_module_and_skips_bound_names() {
        let source = "module t/m\n\
            import std/io (println)\n\
            export func main() -> () ! {IO, FS} {\n\
              println(show(readLine()));\n\
              match readFile(\"x\") { Ok(t) => println(t), Err(e) => println(e) }\n\
            }";
        let suggestions = suggest_imports(source);
        // println is already imported; show is prelude; readLine and
        // readFile need imports.
        let modules: Vec<&str> = suggestions.imports.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(modules, vec!["std/fs", "std/io"]);
        assert_eq!(suggestions.imports[0].symbols, vec!["readFile"]);
        assert_eq!(suggestions.imports[1].symbols, vec!["readLine"]);
        assert_eq!(suggestions.insert_after_line, 2);
    }

    #[test]
    fn apply_is_bottom_up_so_line_numbers_stay_valid() {
        let source = "line one\nline two\nline three";
        let list = EditList {
            schema: EDIT_LIST_SCHEMA.to_string(),
            edits: vec![
                Edit {
                    kind: EditKind::Modify,
                    line: 1,
                    text: None,
                    old: Some("line one".into()),
                    new: Some("first".into()),
                },
                Edit {
                    kind: EditKind::Delete,
                    line: 3,
                    text: None,
                    old: None,
                    new: None,
                },
            ],
        };
        let (rewritten, result) = apply(source, &[list]).unwrap();
        assert_eq!(rewritten, "first\nline two\n");
        assert_eq!(result.applied, 2);
    }

    #[test]
    fn modify_with_stale_old_text_is_refused() {
        let list = EditList {
            schema: EDIT_LIST_SCHEMA.to_string(),
            edits: vec![Edit {
                kind: EditKind::Modify,
                line: 1,
                text: None,
                old: Some("what the file used to say".into()),
                new: Some("x".into()),
            }],
        };
        assert!(apply("actual content", &[list]).is_err());
    }

    #[test]
    fn documents_serialize_byte_stably() {
        let list = normalize("func f() -> Int = 1");
        let a = serde_json::to_string(&list).unwrap();
        let b = serde_json::to_string(&list).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("\"$schema\""));
        assert!(a.contains(EDIT_LIST_SCHEMA));
    }
}
