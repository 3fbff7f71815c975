use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rstest::rstest;
use serde_json::Value;
use serde_json::json;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;
use crate::lexer::tokenize;
use crate::tokens::SpannedToken;
use crate::tokens::Token;

// --- Lexer tests ---

#[rstest]
#[case::plain("plain text", vec![Token::Text("plain text".into())])]
#[case::output("Hi {{ name }}", vec![
	Token::Text("Hi ".into()),
	Token::OutputOpen,
	Token::Code(" name ".into()),
	Token::OutputClose,
])]
#[case::tag("{% set x = 1 %}", vec![Token::TagOpen, Token::Code(" set x = 1 ".into()), Token::TagClose])]
#[case::comment("a{# hidden {{ x }} #}b", vec![Token::Text("a".into()), Token::Text("b".into())])]
#[case::quoted_close(r#"{{ "}}" }}"#, vec![Token::OutputOpen, Token::Code(r#" "}}" "#.into()), Token::OutputClose])]
#[case::quoted_tag_close(r#"{% set x = '%}' %}"#, vec![Token::TagOpen, Token::Code(" set x = '%}' ".into()), Token::TagClose])]
#[case::lone_markers("100% {real} #1", vec![Token::Text("100% {real} #1".into())])]
#[case::quotes_in_text(r#"it's "quoted""#, vec![Token::Text(r#"it's "quoted""#.into())])]
fn tokenize_source(#[case] input: &str, #[case] expected: Vec<Token>) -> QuillResult<()> {
	let tokens: Vec<Token> = tokenize(input)?.into_iter().map(|spanned| spanned.token).collect();
	assert_eq!(tokens, expected);

	Ok(())
}

#[test]
fn tokens_carry_positions() -> QuillResult<()> {
	let tokens = tokenize("Hello {{ name }}!")?;
	let expected = vec![
		SpannedToken::new(Token::Text("Hello ".into()), Position::new(1, 1, 0, 1, 7, 6)),
		SpannedToken::new(Token::OutputOpen, Position::new(1, 7, 6, 1, 9, 8)),
		SpannedToken::new(Token::Code(" name ".into()), Position::new(1, 9, 8, 1, 15, 14)),
		SpannedToken::new(Token::OutputClose, Position::new(1, 15, 14, 1, 17, 16)),
		SpannedToken::new(Token::Text("!".into()), Position::new(1, 17, 16, 1, 18, 17)),
	];
	assert_eq!(tokens, expected);

	let tokens = tokenize("a\n{{ x }}")?;
	assert_eq!(tokens[1].position, Position::new(2, 1, 2, 2, 3, 4));

	Ok(())
}

#[test]
fn tokens_cover_the_whole_input() -> QuillResult<()> {
	let source = "<p>{{ a }}</p>\n{% set b = \"{{\" %}\ntail";
	let rebuilt: String = tokenize(source)?
		.iter()
		.map(|spanned| spanned.token.to_string())
		.collect();
	assert_eq!(rebuilt, source);

	Ok(())
}

#[rstest]
#[case::output("Hi {{ name", "{{", 1, 4)]
#[case::tag("line\n  {% tag", "{%", 2, 3)]
#[case::comment("{# never closed", "{#", 1, 1)]
#[case::open_quote(r#"{{ "}} }}"#, "{{", 1, 1)]
fn unclosed_markers_fail(
	#[case] input: &str,
	#[case] expected_marker: &str,
	#[case] expected_line: usize,
	#[case] expected_column: usize,
) {
	let error = tokenize(input).unwrap_err();
	let QuillError::UnclosedMarker {
		marker,
		line,
		column,
	} = error
	else {
		panic!("expected an unclosed marker, got {error:?}");
	};

	assert_eq!(marker, expected_marker);
	assert_eq!((line, column), (expected_line, expected_column));
}

#[test]
fn point_advances_over_newlines() {
	let mut point = Point::default();
	point.advance_str("ab\ncé");

	assert_eq!(point, Point::new(2, 3, 6));
}

// --- Expression tests ---

#[test]
fn parse_expression_with_filters() -> AnyEmptyResult {
	let expression = Expression::parse(r#"user.name|upper|replace("a", 'b')"#)?;
	let expected = Expression {
		base: Expr::Attribute(Box::new(Expr::Variable("user".into())), "name".into()),
		filters: vec![
			FilterCall {
				name: "upper".into(),
				arguments: vec![],
			},
			FilterCall {
				name: "replace".into(),
				arguments: vec![Expr::Literal(json!("a")), Expr::Literal(json!("b"))],
			},
		],
	};
	assert_eq!(expression, expected);

	Ok(())
}

#[rstest]
#[case::attribute("user.name", json!("Ada"))]
#[case::string_key("user['name']", json!("Ada"))]
#[case::variable_key("user[key]", json!("Ada"))]
#[case::array_index("items[1]", json!(20))]
#[case::nested("user.tags[0]", json!("a"))]
#[case::missing("missing.deep", Value::Null)]
#[case::single_quoted(r"'it\'s'", json!("it's"))]
#[case::double_quoted(r#""a\"b""#, json!("a\"b"))]
#[case::negative("-3", json!(-3))]
#[case::float("1.5", json!(1.5))]
#[case::boolean("true", json!(true))]
#[case::none("none", Value::Null)]
fn evaluate_expression(#[case] source: &str, #[case] expected: Value) -> AnyEmptyResult {
	let scope = context(json!({
		"user": { "name": "Ada", "tags": ["a", "b"] },
		"items": [10, 20, 30],
		"key": "name",
	}));
	let expression = Expression::parse(source)?;
	assert_eq!(expression.base.evaluate(&scope), expected);

	Ok(())
}

#[rstest]
#[case::empty("")]
#[case::dangling_pipe("a |")]
#[case::two_values("a b")]
#[case::dangling_dot("a.")]
#[case::unclosed_index("a[1")]
#[case::unknown_character("@x")]
#[case::missing_comma("x|f(1 2)")]
fn invalid_expressions_fail(#[case] source: &str) {
	assert!(Expression::parse(source).is_err(), "`{source}` should not parse");
}

#[test]
fn parse_bare_filter_chain() -> AnyEmptyResult {
	let filters = Expression::parse_filter_chain("upper | join(\", \")")?;
	let names: Vec<&str> = filters.iter().map(|filter| filter.name.as_str()).collect();
	assert_eq!(names, vec!["upper", "join"]);
	assert_eq!(filters[1].arguments, vec![Expr::Literal(json!(", "))]);

	Ok(())
}

// --- Parser tests ---

#[test]
fn parse_builds_nodes() -> QuillResult<()> {
	let nodes = parse("a{% set x = 1 %}{{ x }}", &Registry::default())?;
	assert_eq!(nodes.len(), 3);
	assert_eq!(nodes[0], Node::Text("a".into()));

	let Node::Tag(tag) = &nodes[1] else {
		panic!("expected a tag, got {:?}", nodes[1]);
	};
	assert_eq!(tag.name, "set");
	assert_eq!(tag.raw_arguments, "x = 1");
	assert_eq!(tag.arguments, vec!["x", "=", "1"]);
	assert!(!tag.is_block);
	assert!(tag.children.is_empty());

	let Node::Output(output) = &nodes[2] else {
		panic!("expected an output, got {:?}", nodes[2]);
	};
	assert_eq!(output.expression.base, Expr::Variable("x".into()));

	Ok(())
}

#[test]
fn parse_nests_block_tags() -> QuillResult<()> {
	let source = "{% autoescape false %}{% spaceless %}<b> x </b>{% endspaceless %}{% \
	              endautoescape %}";
	let nodes = parse(source, &Registry::default())?;
	assert_eq!(nodes.len(), 1);

	let Node::Tag(outer) = &nodes[0] else {
		panic!("expected a tag, got {:?}", nodes[0]);
	};
	assert_eq!(outer.name, "autoescape");
	assert!(outer.is_block);
	assert_eq!(outer.position.start, Point::new(1, 1, 0));
	assert_eq!(outer.position.end.offset, source.len());

	let [Node::Tag(inner)] = outer.children.as_slice() else {
		panic!("expected one nested tag, got {:?}", outer.children);
	};
	assert_eq!(inner.name, "spaceless");
	assert_eq!(inner.children, vec![Node::Text("<b> x </b>".into())]);

	Ok(())
}

#[rstest]
#[case::unexpected_end("{% endspaceless %}", "unexpected end tag `endspaceless` at 1:1")]
#[case::unknown_end("{% endif %}", "unexpected end tag `endif` at 1:1")]
#[case::mismatched_end(
	"{% spaceless %}{% endautoescape %}",
	"expected `endspaceless` but found `endautoescape` at 1:16"
)]
#[case::missing_end("{% spaceless %}x", "missing end tag for block `spaceless` opened at 1:1")]
#[case::unknown_tag("\n\n  {% bogus %}", "unknown tag `bogus` at 3:3")]
#[case::empty_tag("{%   %}", "empty tag at 1:1")]
#[case::invalid_expression("{{ a b }}", "invalid expression at 1:3: unexpected `b`")]
#[case::unclosed("Hi {{ name", "unclosed `{{` opened at 1:4")]
fn malformed_templates_fail(#[case] source: &str, #[case] expected: &str) {
	let error = parse(source, &Registry::default()).unwrap_err();

	assert_eq!(error.kind(), ErrorKind::Syntax);
	assert_eq!(error.to_string(), expected);
}

#[test]
fn unknown_filters_are_not_parse_errors() -> QuillResult<()> {
	let nodes = parse("{{ x|nope }}", &Registry::default())?;
	assert_eq!(nodes.len(), 1);

	let error = strict_engine().compile("{{ x|nope }}").unwrap_err();
	assert_eq!(error.kind(), ErrorKind::Reference);
	assert_eq!(error.to_string(), "unknown filter `nope` at 1:1");

	Ok(())
}

#[rstest]
#[case::assignment("foo = bar", vec!["foo", "=", "bar"])]
#[case::quoted_spaces(r#"x = "a b""#, vec!["x", "=", r#""a b""#])]
#[case::call_arguments(r#"x|replace("a", "b") y"#, vec![r#"x|replace("a", "b")"#, "y"])]
#[case::extra_whitespace("  spaced   out  ", vec!["spaced", "out"])]
#[case::escaped_quote(r"'it\'s ok' next", vec![r"'it\'s ok'", "next"])]
#[case::empty("", vec![])]
fn split_tag_arguments(#[case] raw: &str, #[case] expected: Vec<&str>) {
	assert_eq!(split_arguments(raw), expected);
}

// --- Registry tests ---

#[rstest]
#[case::set("set", Some(TagKind::Standalone))]
#[case::include("include", Some(TagKind::Standalone))]
#[case::autoescape("autoescape", Some(TagKind::Block))]
#[case::spaceless("spaceless", Some(TagKind::Block))]
#[case::filter("filter", Some(TagKind::Block))]
#[case::unknown("nope", None)]
fn builtin_tag_kinds(#[case] name: &str, #[case] expected: Option<TagKind>) {
	assert_eq!(Registry::default().tag_kind(name), expected);
}

#[test]
fn simple_tags_shadow_raw_tags() -> QuillResult<()> {
	let engine = Engine::new(
		strict()
			.simple_tag("set", SimpleTag::standalone(|_| Some("shadowed".into())))
			.tag(
				"spaceless",
				RawTag::standalone(|_| {
					Ok(Fragment::new(|state| {
						state.write("mine");
						Ok(())
					}))
				}),
			),
	);

	assert_eq!(render_with(&engine, "{% set %}", json!({}))?, "shadowed");
	assert_eq!(render_with(&engine, "{% spaceless %}", json!({}))?, "mine");

	Ok(())
}

// --- Filter tests ---

#[test]
fn custom_filter_replaces_output() -> QuillResult<()> {
	let engine = Engine::new(Options::new().filter("foo", |_, _| Ok(json!("bar"))));
	let output = render_with(&engine, "{{ asdf|foo }}", json!({ "asdf": "blah" }))?;
	assert_eq!(output, "bar");

	Ok(())
}

#[test]
fn filter_output_equals_filter_result() -> QuillResult<()> {
	let wrap = |value: &Value, _: &[Value]| -> QuillResult<Value> {
		Ok(json!(format!("<{}>", stringify(value))))
	};
	let engine = Engine::new(strict().autoescape(false).filter("wrap", wrap));
	let template = engine.compile("{{x|wrap}}")?;

	for value in [json!(1), json!("a"), json!([1, 2]), json!(null), json!(true)] {
		let expected = stringify(&wrap(&value, &[])?);
		let output = template.render(&context(json!({ "x": value })))?;
		assert_eq!(output, expected);
	}

	Ok(())
}

#[test]
fn filters_apply_left_to_right() -> QuillResult<()> {
	let engine = Engine::new(
		strict()
			.filter("append_a", |value, _| {
				Ok(json!(format!("{}a", stringify(value))))
			})
			.filter("append_b", |value, _| {
				Ok(json!(format!("{}b", stringify(value))))
			}),
	);

	assert_eq!(render_with(&engine, "{{ x|append_a|append_b }}", json!({ "x": "" }))?, "ab");
	assert_eq!(render_with(&engine, "{{ x|append_b|append_a }}", json!({ "x": "" }))?, "ba");

	Ok(())
}

#[rstest]
#[case::upper("{{ x|upper }}", json!({ "x": "abc" }), "ABC")]
#[case::lower("{{ x|lower }}", json!({ "x": "ABC" }), "abc")]
#[case::capitalize("{{ x|capitalize }}", json!({ "x": "hELLO world" }), "Hello world")]
#[case::title("{{ x|title }}", json!({ "x": "hello big-world" }), "Hello Big-World")]
#[case::length_array("{{ x|length }}", json!({ "x": [1, 2, 3] }), "3")]
#[case::length_string("{{ x|length }}", json!({ "x": "héllo" }), "5")]
#[case::join("{{ x|join(\", \") }}", json!({ "x": ["a", "b"] }), "a, b")]
#[case::default_missing("{{ x|default(\"none\") }}", json!({}), "none")]
#[case::default_present("{{ x|default(\"none\") }}", json!({ "x": "set" }), "set")]
#[case::default_chain("{{ user.name|default(\"anon\")|upper }}", json!({}), "ANON")]
#[case::first("{{ x|first }}", json!({ "x": [5, 6] }), "5")]
#[case::last("{{ x|last }}", json!({ "x": [5, 6] }), "6")]
#[case::reverse("{{ x|reverse|join }}", json!({ "x": ["a", "b", "c"] }), "cba")]
#[case::replace("{{ x|replace(\"a\", \"o\") }}", json!({ "x": "banana" }), "bonono")]
#[case::striptags("{{ x|striptags }}", json!({ "x": "<p>Hi <b>there</b></p>" }), "Hi there")]
#[case::json_safe("{{ x|json|safe }}", json!({ "x": { "a": 1 } }), r#"{"a":1}"#)]
#[case::json_escaped("{{ x|json }}", json!({ "x": { "a": 1 } }), "{&quot;a&quot;:1}")]
#[case::add_numbers("{{ x|add(2) }}", json!({ "x": 40 }), "42")]
#[case::add_strings("{{ x|add(\"b\") }}", json!({ "x": "a" }), "ab")]
#[case::uniq("{{ x|uniq|join(\",\") }}", json!({ "x": [1, 1, 2] }), "1,2")]
#[case::addslashes("{{ x|addslashes|safe }}", json!({ "x": "it's" }), r"it\'s")]
#[case::escape("{{ x|e }}", json!({ "x": "<a>" }), "&lt;a&gt;")]
#[case::autoescape("{{ x }}", json!({ "x": "<a>" }), "&lt;a&gt;")]
#[case::raw("{{ x|raw }}", json!({ "x": "<a>" }), "<a>")]
#[case::whole_float("{{ x }}", json!({ "x": 1.0 }), "1")]
#[case::array("{{ x }}", json!({ "x": [1, 2] }), "1,2")]
#[case::boolean("{{ x }}", json!({ "x": true }), "true")]
#[case::null("{{ x }}", json!({ "x": null }), "")]
fn builtin_filters_render(
	#[case] source: &str,
	#[case] data: Value,
	#[case] expected: &str,
) -> QuillResult<()> {
	assert_eq!(render(source, data)?, expected);

	Ok(())
}

#[test]
fn autoescape_can_be_disabled() -> QuillResult<()> {
	let engine = Engine::new(strict().autoescape(false));
	assert_eq!(render_with(&engine, "{{ x }}", json!({ "x": "<a>" }))?, "<a>");

	Ok(())
}

#[test]
fn failing_filter_depends_on_policy() -> QuillResult<()> {
	let boom = |_: &Value, _: &[Value]| -> QuillResult<Value> {
		Err(QuillError::filter("boom", "exploded"))
	};

	let strict = Engine::new(strict().filter("boom", boom));
	let error = render_with(&strict, "{{ x|boom }}", json!({})).unwrap_err();
	assert_eq!(error.kind(), ErrorKind::Render);

	let lenient = Engine::new(Options::new().filter("boom", boom));
	let output = render_with(&lenient, "before {{ x|boom }}", json!({}))?;
	insta::assert_snapshot!(output, @"<pre>Error: filter `boom` failed: exploded</pre>");

	Ok(())
}

#[test]
fn length_of_a_number_is_a_render_error() {
	let error = render("{{ x|length }}", json!({ "x": 5 })).unwrap_err();

	assert_eq!(error.kind(), ErrorKind::Render);
	assert_eq!(error.to_string(), "filter `length` failed: value has no length");
}

// --- Built-in tag tests ---

#[test]
fn set_binds_for_the_rest_of_the_render() -> QuillResult<()> {
	let template = strict_engine().compile(r#"{% set foo = "foo" %}{{ foo }}"#)?;
	assert_eq!(template.render_empty()?, "foo");

	let output = render(r#"{{ foo }}{% set foo = "bar" %}{{ foo }}"#, json!({ "foo": "a" }))?;
	assert_eq!(output, "abar");

	let output = render("{% set name = user|upper %}{{ name }}", json!({ "user": "ada" }))?;
	assert_eq!(output, "ADA");

	Ok(())
}

#[rstest]
#[case::invalid_name("{% set 1x = 2 %}")]
#[case::missing_value("{% set foo %}")]
#[case::autoescape_flag("{% autoescape maybe %}{% endautoescape %}")]
#[case::spaceless_arguments("{% spaceless now %}{% endspaceless %}")]
#[case::filter_name("{% filter %}{% endfilter %}")]
#[case::include_variable("{% include name %}")]
fn invalid_tag_arguments_fail(#[case] source: &str) {
	let error = strict_engine().compile(source).unwrap_err();

	assert_eq!(error.kind(), ErrorKind::Syntax, "{error}");
}

#[test]
fn autoescape_tag_switches_escaping() -> QuillResult<()> {
	let output = render(
		"{% autoescape false %}{{ x }}{% endautoescape %}{{ x }}",
		json!({ "x": "<b>" }),
	)?;
	assert_eq!(output, "<b>&lt;b&gt;");

	Ok(())
}

#[test]
fn spaceless_removes_whitespace_between_tags() -> QuillResult<()> {
	let output = render(
		"{% spaceless %}<ul>\n  <li>{{ x }} y</li>\n</ul>{% endspaceless %}",
		json!({ "x": "a" }),
	)?;
	assert_eq!(output, "<ul><li>a y</li></ul>");

	Ok(())
}

#[test]
fn filter_tag_filters_its_body() -> QuillResult<()> {
	let output = render(
		"{% filter upper %}hi {{ x }}{% endfilter %}",
		json!({ "x": "there" }),
	)?;
	assert_eq!(output, "HI THERE");

	let output = render(
		r#"{% filter replace("a", "o")|upper %}banana{% endfilter %}"#,
		json!({}),
	)?;
	assert_eq!(output, "BONONO");

	Ok(())
}

// --- Extension contract tests ---

#[test]
fn raw_tag_invokes_extension_once_per_render() -> QuillResult<()> {
	let counter = Arc::new(AtomicUsize::new(0));
	let engine = Engine::new(
		strict()
			.tag(
				"foo",
				RawTag::standalone(|input| {
					let extension = input.extension("foobar")?;

					Ok(Fragment::new(move |_| {
						extension.call(&[]);
						Ok(())
					}))
				}),
			)
			.extension("foobar", counting_extension(&counter)),
	);

	let template = engine.compile("{% foo %}")?;
	assert_eq!(counter.load(Ordering::SeqCst), 0);

	assert_eq!(template.render_empty()?, "");
	assert_eq!(counter.load(Ordering::SeqCst), 1);

	template.render_empty()?;
	assert_eq!(counter.load(Ordering::SeqCst), 2);

	Ok(())
}

#[test]
fn raw_tag_writes_extension_result() -> QuillResult<()> {
	let engine = Engine::new(
		strict()
			.tag("who", extension_tag("name"))
			.extension("name", |_| json!("Ada")),
	);
	assert_eq!(render_with(&engine, "Hello {% who %}", json!({}))?, "Hello Ada");

	Ok(())
}

#[test]
fn unknown_extension_fails_at_compile_time() {
	let engine = Engine::new(strict().tag("who", extension_tag("missing")));
	let error = engine.compile("{% who %}").unwrap_err();

	assert_eq!(error.kind(), ErrorKind::Reference);
	assert_eq!(error.to_string(), "unknown extension `missing`");
}

#[test]
fn simple_tag_receives_evaluated_arguments() -> QuillResult<()> {
	let engine = Engine::new(strict().simple_tag(
		"foo",
		SimpleTag::standalone(|arguments| {
			let first = arguments.first().map(stringify).unwrap_or_default();
			Some(format!("Hello, World's : {first}"))
		}),
	));

	assert_eq!(render_with(&engine, "{% foo %}", json!({}))?, "Hello, World's : ");
	assert!(render_with(&engine, "{% foo 3 %}", json!({}))?.contains("Hello, World's : 3"));
	assert_eq!(
		render_with(&engine, "{% foo name|upper %}", json!({ "name": "ada" }))?,
		"Hello, World's : ADA"
	);

	Ok(())
}

#[test]
fn block_simple_tags_replace_or_default_their_body() -> QuillResult<()> {
	let engine = Engine::new(
		strict()
			.simple_tag("notablock", SimpleTag::block(|_| Some("Hi".into())))
			.simple_tag("notablock2", SimpleTag::block(|_| None)),
	);

	assert_eq!(
		render_with(&engine, "{% notablock %}foo{% endnotablock %}", json!({}))?,
		"Hi"
	);
	assert_eq!(
		render_with(
			&engine,
			"{% notablock %}Foo{% endnotablock %}{% notablock2 %}!{% endnotablock2 %}",
			json!({})
		)?,
		"Hi!"
	);
	assert_eq!(
		render_with(&engine, "{% notablock2 %}{{ x }}{% endnotablock2 %}", json!({ "x": "d" }))?,
		"d"
	);

	let error = engine
		.compile("{% notablock %}{% spaceless %}{% endnotablock %}")
		.unwrap_err();
	assert_eq!(error.kind(), ErrorKind::Syntax);

	Ok(())
}

// --- Engine tests ---

#[test]
fn render_without_context_uses_an_empty_scope() -> QuillResult<()> {
	let template = strict_engine().compile("a{{ missing }}b{{ missing.deep|upper }}c")?;
	assert_eq!(template.render_empty()?, "abc");

	Ok(())
}

#[test]
fn compile_is_deterministic() -> QuillResult<()> {
	let engine = Engine::new(strict().cache(false));
	let source = "{% set y = x|upper %}{{ y }}-{{ x|length }}";
	let data = json!({ "x": "abc" });

	let first = render_with(&engine, source, data.clone())?;
	for _ in 0..3 {
		assert_eq!(render_with(&engine, source, data.clone())?, first);
	}

	Ok(())
}

#[test]
fn init_replaces_instead_of_merging() {
	let mut engine = Engine::new(
		strict()
			.filter("foo", |_, _| Ok(json!("bar")))
			.simple_tag("hello", SimpleTag::standalone(|_| Some("hi".into())))
			.tag("who", extension_tag("name"))
			.extension("name", |_| json!("Ada")),
	);
	assert!(engine.compile("{{ x|foo }}{% hello %}{% who %}").is_ok());

	engine.init(strict().tag("who", extension_tag("name")));

	let error = engine.compile("{{ x|foo }}").unwrap_err();
	assert!(matches!(error, QuillError::UnknownFilter { .. }), "{error}");

	let error = engine.compile("{% hello %}").unwrap_err();
	assert!(matches!(error, QuillError::UnknownTag { .. }), "{error}");

	let error = engine.compile("{% who %}").unwrap_err();
	assert!(matches!(error, QuillError::UnknownExtension(_)), "{error}");

	assert!(engine.compile("{{ x|upper }}{% set y = 1 %}").is_ok());
}

#[test]
fn compiled_templates_keep_their_registry() -> QuillResult<()> {
	let mut engine = Engine::new(strict().filter("foo", |_, _| Ok(json!("bar"))));
	let before = engine.compile("{{ x|foo }}")?;

	engine.init(strict().filter("foo", |_, _| Ok(json!("baz"))));
	let after = engine.compile("{{ x|foo }}")?;

	assert_eq!(before.render_empty()?, "bar");
	assert_eq!(after.render_empty()?, "baz");
	assert!(!Arc::ptr_eq(before.registry(), after.registry()));

	Ok(())
}

#[test]
fn lenient_compile_renders_the_error() -> QuillResult<()> {
	let engine = lenient_engine();
	let template = engine.compile("{% bogus %}")?;

	assert_eq!(template.policy(), ErrorPolicy::Lenient);
	insta::assert_snapshot!(template.render_empty()?, @"<pre>Error: unknown tag `bogus` at 1:1</pre>");

	Ok(())
}

#[test]
fn error_block_escapes_the_message() {
	let error = QuillError::Render("<script>".into());
	assert_eq!(error_block(&error), "<pre>Error: render failed: &lt;script&gt;</pre>");
}

#[test]
fn strict_compile_returns_the_error() {
	let error = strict_engine().compile("{% bogus %}").unwrap_err();
	assert_eq!(error.kind(), ErrorKind::Syntax);
}

#[test]
fn templates_render_across_threads() -> QuillResult<()> {
	let template = strict_engine().compile("{% set y = x|upper %}{{ y }}")?;

	std::thread::scope(|scope| {
		let handles: Vec<_> = (0..4)
			.map(|index| {
				let template = &template;
				scope.spawn(move || template.render(&context(json!({ "x": format!("t{index}") }))))
			})
			.collect();

		for (index, handle) in handles.into_iter().enumerate() {
			let output = handle.join().unwrap_or_else(|_| panic!("render thread panicked"));
			assert_eq!(output.ok(), Some(format!("T{index}")));
		}
	});

	Ok(())
}

// --- Cache tests ---

#[test]
#[traced_test]
fn compile_reuses_cached_templates() -> QuillResult<()> {
	let engine = strict_engine();
	let first = engine.compile("{{ x }}")?;
	let second = engine.compile("{{ x }}")?;

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(
		engine.cache_stats(),
		CacheStats {
			hits: 1,
			misses: 1,
			entries: 1,
		}
	);
	assert!(logs_contain("template cache hit"));

	Ok(())
}

#[test]
fn init_clears_the_cache() -> QuillResult<()> {
	let mut engine = strict_engine();
	engine.compile("{{ x }}")?;
	assert_eq!(engine.cache_stats().entries, 1);

	engine.init(strict());
	assert_eq!(engine.cache_stats(), CacheStats::default());

	Ok(())
}

#[test]
fn disabled_cache_compiles_every_time() -> QuillResult<()> {
	let engine = Engine::new(strict().cache(false));
	let first = engine.compile("{{ x }}")?;
	let second = engine.compile("{{ x }}")?;

	assert!(!Arc::ptr_eq(&first, &second));
	assert_eq!(engine.cache_stats(), CacheStats::default());

	Ok(())
}

#[test]
#[traced_test]
fn failed_compiles_are_not_cached() -> QuillResult<()> {
	let engine = lenient_engine();
	engine.compile("{% bogus %}")?;
	engine.compile("{% bogus %}")?;

	assert_eq!(engine.cache_stats().entries, 0);
	assert!(logs_contain("compilation failed"));

	Ok(())
}

#[test]
fn identical_source_shares_an_identity() {
	assert_eq!(
		TemplateIdentity::from_source("{{ a }}"),
		TemplateIdentity::from_source("{{ a }}")
	);
	assert_ne!(
		TemplateIdentity::from_source("{{ a }}"),
		TemplateIdentity::from_source("{{ b }}")
	);
}

// --- Resolver and file tests ---

#[test]
fn resolve_tries_roots_in_order() -> QuillResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let first = tmp.path().join("first");
	let second = tmp.path().join("second");
	write_template(&first, "both.html", "first");
	write_template(&second, "both.html", "second");
	write_template(&second, "only.html", "second");

	let roots = vec![first.clone(), second.clone()];
	assert_eq!(resolve("both.html", &roots)?, first.join("both.html"));
	assert_eq!(resolve("only.html", &roots)?, second.join("only.html"));

	Ok(())
}

#[test]
fn resolve_stops_after_one_attempt_per_root() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let roots = vec![tmp.path().join("a"), tmp.path().join("b"), tmp.path().join("c")];

	let error = resolve("missing.html", &roots).unwrap_err();
	let QuillError::NotFound { attempts, .. } = &error else {
		panic!("expected not found, got {error:?}");
	};

	assert_eq!(*attempts, 3);
	assert_eq!(error.kind(), ErrorKind::NotFound);
	assert!(
		error
			.to_string()
			.to_lowercase()
			.contains("no such file or directory")
	);
}

#[test]
fn resolve_uses_absolute_paths_directly() -> QuillResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let path = write_template(tmp.path(), "abs.html", "absolute");
	let identifier = path.to_string_lossy();

	let resolved = resolve(&identifier, &[PathBuf::from("/does/not/exist")])?;
	assert_eq!(resolved, path);

	Ok(())
}

#[test]
fn resolve_rejects_directories() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	std::fs::create_dir_all(tmp.path().join("dir")).unwrap_or_else(|e| panic!("mkdir: {e}"));

	let error = resolve("dir", &[tmp.path().to_path_buf()]).unwrap_err();
	assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[test]
fn include_renders_with_the_shared_scope() -> QuillResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_template(tmp.path(), "partial.html", "{{ title }}{% set shared = \"yes\" %}");
	write_template(tmp.path(), "parent.html", "<h1>{% include \"partial.html\" %}</h1>{{ shared }}");

	let engine = Engine::new(strict().root(tmp.path()));
	let output = engine
		.compile_file("parent.html")?
		.render(&context(json!({ "title": "Hi" })))?;
	assert_eq!(output, "<h1>Hi</h1>yes");

	let output = engine
		.compile("{% include 'partial.html' %}")?
		.render(&context(json!({ "title": "source" })))?;
	assert_eq!(output, "source");

	Ok(())
}

#[test]
fn includes_are_compiled_once() -> QuillResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_template(tmp.path(), "partial.html", "p");
	write_template(
		tmp.path(),
		"parent.html",
		"{% include \"partial.html\" %}{% include \"partial.html\" %}",
	);

	let engine = Engine::new(strict().root(tmp.path()));
	assert_eq!(engine.compile_file("parent.html")?.render_empty()?, "pp");
	assert_eq!(
		engine.cache_stats(),
		CacheStats {
			hits: 1,
			misses: 2,
			entries: 2,
		}
	);

	let first = engine.compile_file("parent.html")?;
	let second = engine.compile_file("parent.html")?;
	assert!(Arc::ptr_eq(&first, &second));

	Ok(())
}

#[rstest]
#[case::self_include("self.html")]
#[case::indirect("a.html")]
fn circular_includes_fail(#[case] entry: &str) {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_template(tmp.path(), "self.html", "{% include \"self.html\" %}");
	write_template(tmp.path(), "a.html", "{% include \"b.html\" %}");
	write_template(tmp.path(), "b.html", "{% include \"a.html\" %}");

	let engine = Engine::new(strict().root(tmp.path()));
	let error = engine.compile_file(entry).unwrap_err();

	assert!(matches!(error, QuillError::CircularInclude { .. }), "{error}");
	assert_eq!(engine.cache_stats().entries, 0);
}

#[test]
fn missing_include_is_not_found() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let engine = Engine::new(strict().root(tmp.path()));
	let error = engine.compile("{% include \"nope.html\" %}").unwrap_err();

	assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[test]
fn lenient_missing_file_renders_the_io_error() -> QuillResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_template(tmp.path(), "includes_missing.html", "{% include \"foobar.html\" %}");
	let engine = Engine::new(Options::new().root(tmp.path()).allow_errors(false));

	for identifier in ["foobar.html", "includes_missing.html"] {
		let output = engine.compile_file(identifier)?.render_empty()?.to_lowercase();
		assert!(output.starts_with("<pre>error: "), "{output}");
		assert!(output.contains("no such file or directory"), "{output}");
	}

	Ok(())
}

#[test]
fn disabled_file_access_always_fails() {
	for policy in [ErrorPolicy::Strict, ErrorPolicy::Lenient] {
		let engine = Engine::new(
			Options::new()
				.policy(policy)
				.file_access(FileAccess::Disabled),
		);

		let error = engine.compile_file("anything.html").unwrap_err();
		assert_eq!(error.kind(), ErrorKind::EnvironmentUnsupported);

		let error = engine.compile("{% include \"anything.html\" %}").unwrap_err();
		assert_eq!(error.kind(), ErrorKind::EnvironmentUnsupported);

		assert!(engine.compile("{{ fine }}").is_ok());
	}
}

// --- Context tests ---

#[test]
fn context_from_values() -> QuillResult<()> {
	assert!(Context::try_from(json!(null))?.is_empty());
	assert_eq!(Context::try_from(json!({ "a": 1 }))?.get("a"), Some(&json!(1)));

	let error = Context::try_from(json!(3)).unwrap_err();
	assert_eq!(error.to_string(), "context must be a mapping, got a number");

	#[derive(serde::Serialize)]
	struct Page {
		title: &'static str,
		tags: Vec<&'static str>,
	}

	let page = Context::from_serialize(&Page {
		title: "Home",
		tags: vec!["a", "b"],
	})?;
	let output = strict_engine()
		.compile("{{ title }}: {{ tags|join(\" \") }}")?
		.render(&page)?;
	assert_eq!(output, "Home: a b");

	Ok(())
}

// --- Config tests ---

#[test]
fn root_candidates() -> QuillResult<()> {
	let cwd = std::env::current_dir()?;

	assert_eq!(Root::from("a").candidates(), vec![PathBuf::from("a")]);
	assert_eq!(
		Root::from(["a", "b"]).candidates(),
		vec![PathBuf::from("a"), PathBuf::from("b")]
	);
	assert_eq!(Root::Default.candidates(), vec![cwd.clone()]);
	assert_eq!(Root::Many(vec![]).candidates(), vec![cwd]);

	Ok(())
}

#[rstest]
#[case::allow_errors(true, ErrorPolicy::Strict)]
#[case::suppress_errors(false, ErrorPolicy::Lenient)]
fn allow_errors_selects_policy(#[case] allow_errors: bool, #[case] expected: ErrorPolicy) {
	let registry = Registry::new(Options::new().allow_errors(allow_errors));
	assert_eq!(registry.policy(), expected);
}

#[test]
fn default_options() {
	let registry = Registry::default();

	assert_eq!(registry.policy(), ErrorPolicy::Lenient);
	assert!(registry.autoescape());
	assert!(registry.cache_enabled());
	assert_eq!(registry.file_access(), FileAccess::Enabled);
}

#[test]
fn load_config_from_dir() -> QuillResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_template(
		tmp.path(),
		"quill.toml",
		"root = [\"templates\", \"shared\"]\nallow_errors = true\nautoescape = false\n",
	);

	let config = QuillConfig::load(tmp.path())?.unwrap_or_else(|| panic!("config not found"));
	assert_eq!(
		config.root,
		Some(RootSetting::Many(vec![
			PathBuf::from("templates"),
			PathBuf::from("shared")
		]))
	);
	assert_eq!(config.cache, None);

	let registry = Registry::new(Options::from_dir(tmp.path())?);
	assert_eq!(
		registry.roots(),
		[tmp.path().join("templates"), tmp.path().join("shared")]
	);
	assert_eq!(registry.policy(), ErrorPolicy::Strict);
	assert!(!registry.autoescape());
	assert!(registry.cache_enabled());

	Ok(())
}

#[test]
fn config_candidates_follow_precedence() -> QuillResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_template(tmp.path(), ".config/quill.toml", "root = \"nested\"\n");
	assert_eq!(
		QuillConfig::resolve_path(tmp.path()),
		Some(tmp.path().join(".config/quill.toml"))
	);

	write_template(tmp.path(), ".quill.toml", "root = \"hidden\"\n");
	write_template(tmp.path(), "quill.toml", "root = \"visible\"\n");

	let config = QuillConfig::load(tmp.path())?.unwrap_or_else(|| panic!("config not found"));
	assert_eq!(config.root, Some(RootSetting::Single(PathBuf::from("visible"))));

	Ok(())
}

#[test]
fn missing_config_uses_defaults() -> QuillResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));

	assert!(QuillConfig::load(tmp.path())?.is_none());
	assert_eq!(
		Registry::new(Options::from_dir(tmp.path())?).policy(),
		ErrorPolicy::Lenient
	);

	Ok(())
}

#[rstest]
#[case::invalid_toml("root = [")]
#[case::unknown_key("roots = \"templates\"")]
#[case::wrong_type("allow_errors = \"yes\"")]
fn invalid_config_fails(#[case] content: &str) {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_template(tmp.path(), "quill.toml", content);

	let error = QuillConfig::load(tmp.path()).unwrap_err();
	assert_eq!(error.kind(), ErrorKind::Config);
}

// --- Value tests ---

#[rstest]
#[case::null(Value::Null, "")]
#[case::integer(json!(42), "42")]
#[case::whole_float(json!(2.0), "2")]
#[case::fraction(json!(2.5), "2.5")]
#[case::string(json!("text"), "text")]
#[case::nested_array(json!([1, [2, 3], null]), "1,2,3,")]
#[case::object(json!({ "a": true }), r#"{"a":true}"#)]
fn stringify_values(#[case] value: Value, #[case] expected: &str) {
	assert_eq!(stringify(&value), expected);
}

#[test]
fn escape_html_characters() {
	assert_eq!(
		escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
		"&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
	);
}
