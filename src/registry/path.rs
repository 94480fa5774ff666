//! Dotted paths into describe payloads.
//!
//! `a.b` walks objects, `a[]` flattens an array, `a[Key=Name]` keeps only the
//! array elements whose `Key` field equals `Name`.

use serde_json::Value;

#[derive(Clone, Copy)]
enum Step<'p> {
    Field(&'p str),
    Each(&'p str),
    Select {
        field: &'p str,
        key: &'p str,
        want: &'p str,
    },
}

fn parse(segment: &str) -> Option<Step<'_>> {
    let Some(open) = segment.find('[') else {
        return Some(Step::Field(segment));
    };
    let field = &segment[..open];
    let inner = segment[open + 1..].strip_suffix(']')?;
    if inner.is_empty() {
        return Some(Step::Each(field));
    }
    let (key, want) = inner.split_once('=')?;
    Some(Step::Select { field, key, want })
}

/// Every value reachable through `path`.
pub fn select<'v>(payload: &'v Value, path: &str) -> Vec<&'v Value> {
    let mut current = vec![payload];
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let Some(step) = parse(segment) else {
            return Vec::new();
        };
        let mut next = Vec::new();
        for v in current {
            match step {
                Step::Field(f) => next.extend(v.get(f)),
                Step::Each(f) => {
                    if let Some(Value::Array(items)) = v.get(f) {
                        next.extend(items.iter());
                    }
                }
                Step::Select { field, key, want } => {
                    if let Some(Value::Array(items)) = v.get(field) {
                        next.extend(
                            items
                                .iter()
                                .filter(|i| i.get(key).and_then(|k| k.as_str()) == Some(want)),
                        );
                    }
                }
            }
        }
        current = next;
    }
    current.retain(|v| !v.is_null());
    current
}

/// First value reachable through `path`, cloned.
pub fn first(payload: &Value, path: &str) -> Option<Value> {
    select(payload, path).into_iter().next().cloned()
}

/// Every string (or number, rendered) reachable through `path`.
pub fn strings(payload: &Value, path: &str) -> Vec<String> {
    select(payload, path)
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}
