//! Command palette: built-in verbs, registry lookup and suggestions.

use anyhow::Result;

use crate::registry::{Registry, ResourceTypeDescriptor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub help: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Quit,
    Help,
    Context,
    Region,
    Refresh,
    Import,
    Add,
    Keys,
}

const BUILTINS: &[(Builtin, CommandDef)] = &[
    (
        Builtin::Quit,
        CommandDef {
            name: "quit",
            aliases: &["q", "exit"],
            usage: "quit",
            help: "Exit",
        },
    ),
    (
        Builtin::Help,
        CommandDef {
            name: "help",
            aliases: &["h", "?"],
            usage: "help",
            help: "List commands and resource kinds",
        },
    ),
    (
        Builtin::Context,
        CommandDef {
            name: "context",
            aliases: &["ctx"],
            usage: "context [name]",
            help: "Switch context, or list contexts",
        },
    ),
    (
        Builtin::Region,
        CommandDef {
            name: "region",
            aliases: &[],
            usage: "region [name]",
            help: "Switch region, or list regions",
        },
    ),
    (
        Builtin::Refresh,
        CommandDef {
            name: "refresh",
            aliases: &["r"],
            usage: "refresh",
            help: "Reload the current list",
        },
    ),
    (
        Builtin::Import,
        CommandDef {
            name: "import",
            aliases: &[],
            usage: "import [env|<path>]",
            help: "Import contexts from the environment or a JSON file",
        },
    ),
    (
        Builtin::Add,
        CommandDef {
            name: "add",
            aliases: &[],
            usage: "add",
            help: "Add a context by hand; its keys are verified first",
        },
    ),
    (
        Builtin::Keys,
        CommandDef {
            name: "keys",
            aliases: &["ssh"],
            usage: "keys",
            help: "List SSH keys",
        },
    ),
];

pub fn builtin_defs() -> impl Iterator<Item = &'static CommandDef> {
    BUILTINS.iter().map(|(_, d)| d)
}

/// What a palette line resolves to.
#[derive(Debug)]
pub enum Command {
    Builtin(Builtin, Vec<String>),
    Kind(&'static ResourceTypeDescriptor, Vec<String>),
}

/// Built-in verbs win over resource kinds; unknown tokens are an error
/// message for the active screen.
pub fn parse(registry: &Registry, line: &str) -> std::result::Result<Option<Command>, String> {
    let line = line.trim().trim_start_matches(':').trim_start();
    let tokens = tokenize(line).map_err(|e| e.to_string())?;
    let Some((first, rest)) = tokens.split_first() else {
        return Ok(None);
    };
    let word = first.to_lowercase();
    let args = rest.to_vec();
    if let Some((b, _)) = BUILTINS
        .iter()
        .find(|(_, d)| d.name == word || d.aliases.contains(&word.as_str()))
    {
        return Ok(Some(Command::Builtin(*b, args)));
    }
    match registry.resolve(&word) {
        Ok(desc) => Ok(Some(Command::Kind(desc, args))),
        Err(_) => Err(format!("unknown command `{}` (try `help`)", first)),
    }
}

/// Split on whitespace, honoring double quotes and backslash escapes.
pub fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            cur.push(ch);
            escape = false;
            continue;
        }
        match ch {
            '\\' => escape = true,
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }

    if escape {
        anyhow::bail!("dangling escape");
    }
    if in_quotes {
        anyhow::bail!("unterminated quote");
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    Ok(out)
}

pub fn score_match(q: &str, candidate: &str) -> i32 {
    let q = q.to_lowercase();
    let c = candidate.to_lowercase();
    if c == q {
        return 100;
    }
    if c.starts_with(&q) {
        return 50 - (c.len() as i32 - q.len() as i32);
    }
    if c.contains(&q) {
        return 10;
    }
    0
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suggestion {
    pub name: String,
    pub aliases: Vec<String>,
    pub help: String,
    pub score: i32,
}

/// Ranked completions for the first word of `input`.
pub fn suggestions(registry: &Registry, input: &str, limit: usize) -> Vec<Suggestion> {
    let q = input.trim().trim_start_matches(':').trim_start();
    if q.is_empty() || q.contains(char::is_whitespace) {
        return Vec::new();
    }

    let mut scored: Vec<Suggestion> = builtin_defs()
        .map(|d| Suggestion {
            name: d.name.to_string(),
            aliases: d.aliases.iter().map(|a| a.to_string()).collect(),
            help: d.help.to_string(),
            score: 0,
        })
        .chain(registry.kinds().iter().map(|d| Suggestion {
            name: d.command_name(),
            aliases: d.aliases.iter().map(|a| a.to_string()).collect(),
            help: format!("List {}", d.canonical),
            score: 0,
        }))
        .filter_map(|mut s| {
            let best = std::iter::once(s.name.as_str())
                .chain(s.aliases.iter().map(|a| a.as_str()))
                .map(|c| score_match(q, c))
                .max()
                .unwrap_or(0);
            (best > 0).then(|| {
                s.score = best;
                s
            })
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    scored.truncate(limit);
    scored
}
