//! Built-in tags. Each one is an ordinary [`RawTag`], so user tags registered
//! under the same name replace them.

use serde_json::Value;

use crate::Fragment;
use crate::QuillResult;
use crate::RawTag;
use crate::RawTagInput;
use crate::stringify;

/// The raw tags installed underneath every configuration.
pub fn builtin_tags() -> Vec<(&'static str, RawTag)> {
	vec![
		("set", RawTag::standalone(set)),
		("autoescape", RawTag::block(autoescape)),
		("spaceless", RawTag::block(spaceless)),
		("filter", RawTag::block(filter)),
	]
}

/// `{% set name = expression %}` binds `name` for the rest of the render.
fn set(input: &RawTagInput<'_>) -> QuillResult<Fragment> {
	let Some((name, expression)) = input.raw_arguments().split_once('=') else {
		return Err(input.invalid_arguments("expected `name = expression`"));
	};

	let name = name.trim();
	if !is_identifier(name) {
		return Err(input.invalid_arguments(format!("`{name}` is not a valid variable name")));
	}

	let expression = input.compile_expression(expression.trim())?;
	let name = name.to_string();

	Ok(Fragment::new(move |state| {
		let value = state.evaluate(&expression)?;
		state.set(name.clone(), value);
		Ok(())
	}))
}

fn is_identifier(name: &str) -> bool {
	let mut chars = name.chars();

	chars
		.next()
		.is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '$')
		&& chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$')
}

/// `{% autoescape false %} … {% endautoescape %}` switches escaping for the
/// body.
fn autoescape(input: &RawTagInput<'_>) -> QuillResult<Fragment> {
	let enabled = match input.arguments() {
		[] => true,
		[flag] if flag == "true" => true,
		[flag] if flag == "false" => false,
		_ => return Err(input.invalid_arguments("expected `true` or `false`")),
	};
	let body = input.body().cloned().unwrap_or_default();

	Ok(Fragment::new(move |state| {
		let outer = state.autoescape();
		state.set_autoescape(enabled);
		let result = state.write_body(&body);
		state.set_autoescape(outer);
		result
	}))
}

/// `{% spaceless %} … {% endspaceless %}` removes whitespace between HTML
/// tags.
fn spaceless(input: &RawTagInput<'_>) -> QuillResult<Fragment> {
	if !input.arguments().is_empty() {
		return Err(input.invalid_arguments("takes no arguments"));
	}
	let body = input.body().cloned().unwrap_or_default();

	Ok(Fragment::new(move |state| {
		let rendered = state.render_body(&body)?;
		state.write(&strip_whitespace_between_tags(&rendered));
		Ok(())
	}))
}

fn strip_whitespace_between_tags(html: &str) -> String {
	let mut stripped = String::with_capacity(html.len());
	let mut pending = String::new();
	let mut after_tag = false;

	for ch in html.chars() {
		if after_tag && ch.is_whitespace() {
			pending.push(ch);
			continue;
		}

		if ch != '<' {
			stripped.push_str(&pending);
		}
		pending.clear();
		stripped.push(ch);
		after_tag = ch == '>';
	}

	stripped.push_str(&pending);
	stripped
}

/// `{% filter upper | replace("a", "b") %} … {% endfilter %}` runs the
/// rendered body through a filter chain.
fn filter(input: &RawTagInput<'_>) -> QuillResult<Fragment> {
	if input.raw_arguments().is_empty() {
		return Err(input.invalid_arguments("expected a filter name"));
	}

	let chain = input.compile_filter_chain(input.raw_arguments())?;
	let body = input.body().cloned().unwrap_or_default();

	Ok(Fragment::new(move |state| {
		let rendered = state.render_body(&body)?;
		let value = chain.apply(Value::String(rendered), state.scope())?;
		state.write(&stringify(&value));
		Ok(())
	}))
}
