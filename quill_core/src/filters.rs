use serde_json::Value;

use crate::Filter;
use crate::QuillError;
use crate::QuillResult;
use crate::escape_html;
use crate::is_absent;
use crate::stringify;

/// The filters installed underneath every configuration.
pub fn builtin_filters() -> Vec<(&'static str, Filter)> {
	vec![
		("upper", Filter::new(upper)),
		("lower", Filter::new(lower)),
		("capitalize", Filter::new(capitalize)),
		("title", Filter::new(title)),
		("length", Filter::new(length)),
		("join", Filter::new(join)),
		("default", Filter::new(default)),
		("first", Filter::new(first)),
		("last", Filter::new(last)),
		("reverse", Filter::new(reverse)),
		("escape", Filter::new(escape)),
		("e", Filter::new(escape)),
		("safe", Filter::new(identity)),
		("raw", Filter::new(identity)),
		("replace", Filter::new(replace)),
		("striptags", Filter::new(striptags)),
		("json_encode", Filter::new(json_encode)),
		("json", Filter::new(json_encode)),
		("add", Filter::new(add)),
		("uniq", Filter::new(uniq)),
		("addslashes", Filter::new(addslashes)),
	]
}

/// Apply `transform` to strings, and to every string inside arrays and
/// objects.
fn map_strings(value: &Value, transform: &dyn Fn(&str) -> String) -> Value {
	match value {
		Value::String(string) => Value::String(transform(string)),
		Value::Array(items) => {
			Value::Array(items.iter().map(|item| map_strings(item, transform)).collect())
		}
		Value::Object(map) => {
			Value::Object(
				map.iter()
					.map(|(key, item)| (key.clone(), map_strings(item, transform)))
					.collect(),
			)
		}
		Value::Null => Value::Null,
		other => Value::String(transform(&stringify(other))),
	}
}

fn upper(value: &Value, _: &[Value]) -> QuillResult<Value> {
	Ok(map_strings(value, &|text| text.to_uppercase()))
}

fn lower(value: &Value, _: &[Value]) -> QuillResult<Value> {
	Ok(map_strings(value, &|text| text.to_lowercase()))
}

fn capitalize_word(word: &str) -> String {
	let mut chars = word.chars();

	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
		None => String::new(),
	}
}

fn capitalize(value: &Value, _: &[Value]) -> QuillResult<Value> {
	Ok(map_strings(value, &capitalize_word))
}

fn title(value: &Value, _: &[Value]) -> QuillResult<Value> {
	Ok(map_strings(value, &|text| {
		let mut titled = String::with_capacity(text.len());
		let mut word = String::new();

		for ch in text.chars() {
			if ch.is_whitespace() || ch == '-' {
				titled.push_str(&capitalize_word(&word));
				titled.push(ch);
				word.clear();
			} else {
				word.push(ch);
			}
		}

		titled.push_str(&capitalize_word(&word));
		titled
	}))
}

fn length(value: &Value, _: &[Value]) -> QuillResult<Value> {
	let length = match value {
		Value::String(string) => string.chars().count(),
		Value::Array(items) => items.len(),
		Value::Object(map) => map.len(),
		Value::Null => 0,
		_ => return Err(QuillError::filter("length", "value has no length")),
	};

	Ok(Value::from(length))
}

fn join(value: &Value, arguments: &[Value]) -> QuillResult<Value> {
	let separator = arguments.first().map(stringify).unwrap_or_default();

	let joined = match value {
		Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(&separator),
		Value::Object(map) => map.values().map(stringify).collect::<Vec<_>>().join(&separator),
		other => stringify(other),
	};

	Ok(Value::String(joined))
}

fn default(value: &Value, arguments: &[Value]) -> QuillResult<Value> {
	let empty_string = matches!(value, Value::String(string) if string.is_empty());

	if is_absent(value) || empty_string {
		Ok(arguments.first().cloned().unwrap_or(Value::Null))
	} else {
		Ok(value.clone())
	}
}

fn first(value: &Value, _: &[Value]) -> QuillResult<Value> {
	let found = match value {
		Value::Array(items) => items.first().cloned(),
		Value::String(string) => string.chars().next().map(|ch| Value::String(ch.to_string())),
		_ => None,
	};

	Ok(found.unwrap_or(Value::Null))
}

fn last(value: &Value, _: &[Value]) -> QuillResult<Value> {
	let found = match value {
		Value::Array(items) => items.last().cloned(),
		Value::String(string) => string.chars().last().map(|ch| Value::String(ch.to_string())),
		_ => None,
	};

	Ok(found.unwrap_or(Value::Null))
}

fn reverse(value: &Value, _: &[Value]) -> QuillResult<Value> {
	match value {
		Value::Array(items) => Ok(Value::Array(items.iter().rev().cloned().collect())),
		Value::String(string) => Ok(Value::String(string.chars().rev().collect())),
		other => Ok(other.clone()),
	}
}

fn escape(value: &Value, _: &[Value]) -> QuillResult<Value> {
	Ok(map_strings(value, &escape_html))
}

fn identity(value: &Value, _: &[Value]) -> QuillResult<Value> {
	Ok(value.clone())
}

fn replace(value: &Value, arguments: &[Value]) -> QuillResult<Value> {
	let [search, replacement, ..] = arguments else {
		return Err(QuillError::filter(
			"replace",
			"expected a search string and a replacement",
		));
	};

	let search = stringify(search);
	let replacement = stringify(replacement);

	if search.is_empty() {
		return Ok(value.clone());
	}

	Ok(map_strings(value, &|text| text.replace(&search, &replacement)))
}

fn striptags(value: &Value, _: &[Value]) -> QuillResult<Value> {
	Ok(map_strings(value, &|text| {
		let mut stripped = String::with_capacity(text.len());
		let mut in_tag = false;

		for ch in text.chars() {
			match ch {
				'<' => in_tag = true,
				'>' if in_tag => in_tag = false,
				ch if !in_tag => stripped.push(ch),
				_ => {}
			}
		}

		stripped
	}))
}

fn json_encode(value: &Value, _: &[Value]) -> QuillResult<Value> {
	serde_json::to_string(value)
		.map(Value::String)
		.map_err(|e| QuillError::filter("json_encode", e.to_string()))
}

fn add(value: &Value, arguments: &[Value]) -> QuillResult<Value> {
	let Some(operand) = arguments.first() else {
		return Err(QuillError::filter("add", "expected a value to add"));
	};

	let sum = match (value, operand) {
		(Value::Array(items), Value::Array(more)) => {
			Value::Array(items.iter().chain(more).cloned().collect())
		}
		(Value::Array(items), other) => {
			let mut items = items.clone();
			items.push(other.clone());
			Value::Array(items)
		}
		(Value::Object(map), Value::Object(more)) => {
			let mut map = map.clone();
			map.extend(more.iter().map(|(key, item)| (key.clone(), item.clone())));
			Value::Object(map)
		}
		(Value::Number(left), Value::Number(right)) => {
			match (left.as_i64(), right.as_i64()) {
				(Some(left), Some(right)) => {
					left.checked_add(right)
						.map_or_else(|| float_sum(left as f64, right as f64), Value::from)
				}
				_ => {
					float_sum(
						left.as_f64().unwrap_or_default(),
						right.as_f64().unwrap_or_default(),
					)
				}
			}
		}
		(left, right) => Value::String(format!("{}{}", stringify(left), stringify(right))),
	};

	Ok(sum)
}

fn float_sum(left: f64, right: f64) -> Value {
	serde_json::Number::from_f64(left + right).map_or(Value::Null, Value::Number)
}

fn uniq(value: &Value, _: &[Value]) -> QuillResult<Value> {
	let Value::Array(items) = value else {
		return Ok(value.clone());
	};

	let mut unique: Vec<Value> = Vec::with_capacity(items.len());

	for item in items {
		if !unique.contains(item) {
			unique.push(item.clone());
		}
	}

	Ok(Value::Array(unique))
}

fn addslashes(value: &Value, _: &[Value]) -> QuillResult<Value> {
	Ok(map_strings(value, &|text| {
		let mut escaped = String::with_capacity(text.len());

		for ch in text.chars() {
			if matches!(ch, '\\' | '\'' | '"') {
				escaped.push('\\');
			}
			escaped.push(ch);
		}

		escaped
	}))
}
