use serde_json::Value;

/// Render a value as output text.
///
/// Null renders as the empty string, whole floats render without a
/// fractional part and arrays render as their comma-joined items.
pub fn stringify(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::Bool(boolean) => boolean.to_string(),
		Value::Number(number) => {
			if number.is_f64() {
				number.as_f64().map_or_else(|| number.to_string(), format_float)
			} else {
				number.to_string()
			}
		}
		Value::String(string) => string.clone(),
		Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
		Value::Object(_) => value.to_string(),
	}
}

fn format_float(float: f64) -> String {
	if float.fract() == 0.0 && float.abs() < 1e15 {
		format!("{}", float as i64)
	} else {
		float.to_string()
	}
}

/// Whether a value counts as "missing" for fallbacks such as the `default`
/// filter.
pub fn is_absent(value: &Value) -> bool {
	matches!(value, Value::Null | Value::Bool(false))
}

/// Escape the characters that are significant in HTML.
pub fn escape_html(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());

	for ch in text.chars() {
		match ch {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			'\'' => escaped.push_str("&#39;"),
			ch => escaped.push(ch),
		}
	}

	escaped
}
