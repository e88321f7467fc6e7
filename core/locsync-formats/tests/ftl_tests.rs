use locsync_formats::{Format, FormatContext, FormatError, ParsedResource};
use locsync_types::{Message, Pattern, PatternElement, Placeholder, PlaceholderKind, Selector};
use pretty_assertions::assert_eq;

const FTL: &str = "### Resource comment

# Greeting shown on start
hello = Hello, { $name }!
emails =
    { $count ->
        [one] One email
       *[other] { $count } emails
    }

## Branding

-brand = Firefox
    .gender = masculine
about = About { -brand }
";

fn parse(text: &str) -> ParsedResource {
    Format::Ftl.parse(text.as_bytes(), &FormatContext::default()).unwrap()
}

fn render(resource: &ParsedResource) -> String {
    String::from_utf8(Format::Ftl.serialize(resource, &FormatContext::default())).unwrap()
}

// ── Parsing ───────────────────────────────────────────────────────

#[test]
fn single_message_roundtrip() {
    let resource = parse("key = Value\n");
    let unit = resource.unit("key").unwrap();
    assert_eq!(unit.value, Message::plain("Value"));
    assert_eq!(render(&resource), "key = Value\n");
}

#[test]
fn unchanged_value_keeps_bytes() {
    let mut resource = parse("key   =   Value\n");
    resource.set_value("key", Message::plain("Value"));
    assert!(!resource.is_dirty());
    assert_eq!(render(&resource), "key   =   Value\n");
}

#[test]
fn parses_messages_terms_and_comments() {
    let resource = parse(FTL);
    let keys: Vec<&str> = resource.units().map(|u| u.key.as_str()).collect();
    assert_eq!(keys, vec!["hello", "emails", "-brand", "about"]);

    let hello = resource.unit("hello").unwrap();
    assert_eq!(hello.comment.as_deref(), Some("Greeting shown on start"));
    assert_eq!(hello.value.placeholders()[0].kind, PlaceholderKind::Variable);
    assert_eq!(hello.value.to_plain_text(), "Hello, { $name }!");

    let brand = resource.unit("-brand").unwrap();
    assert_eq!(brand.value.to_plain_text(), "Firefox");
    assert_eq!(brand.value.attributes[0].name, "gender");

    let about = resource.unit("about").unwrap();
    assert_eq!(about.value.placeholders()[0].kind, PlaceholderKind::Reference);
    assert_eq!(render(&resource), FTL);
}

#[test]
fn select_expression_is_canonical() {
    let resource = parse(FTL);
    let emails = &resource.unit("emails").unwrap().value;
    let select = emails.pattern.as_select().unwrap();
    assert_eq!(select.selector, Selector::Expression("$count".into()));
    assert_eq!(select.variant("one").unwrap().to_plain_text(), "One email");
    assert_eq!(select.catch_all().unwrap().value.to_plain_text(), "{ $count } emails");
    assert_eq!(emails.variant_texts().len(), 2);
}

#[test]
fn invalid_entry_is_a_parse_error() {
    let err = Format::Ftl
        .parse(b"ok = Fine\nbroken = { $name\n", &FormatContext::default())
        .unwrap_err();
    assert!(matches!(err, FormatError::Parse { line: 2, .. }));
}

#[test]
fn stray_indented_text_is_rejected() {
    let err = Format::Ftl
        .parse(b"\n\n  orphan\n", &FormatContext::default())
        .unwrap_err();
    assert!(matches!(err, FormatError::Parse { .. }));
}

// ── Rendering ─────────────────────────────────────────────────────

#[test]
fn modified_entry_is_rerendered_with_its_comment() {
    let mut resource = parse(FTL);
    let mut pattern = Pattern::text("Hi, ");
    pattern.push(PatternElement::Placeholder(Placeholder::new(
        PlaceholderKind::Variable,
        "{ $name }",
    )));
    pattern.push_text("!");
    resource.set_value("hello", Message::from_pattern(pattern));
    let out = render(&resource);
    assert_eq!(
        out,
        FTL.replace(
            "hello = Hello, { $name }!",
            "hello = Hi, { $name }!"
        )
    );
}

#[test]
fn multiline_text_uses_block_form() {
    let mut resource = parse("a = A\n");
    resource.set_value("a", Message::plain("Line one\nLine two"));
    assert_eq!(render(&resource), "a =\n    Line one\n    Line two\n");
    let again = parse(&render(&resource));
    assert_eq!(again.unit("a").unwrap().value, Message::plain("Line one\nLine two"));
}

#[test]
fn rendered_select_parses_back_identically() {
    let resource = parse(FTL);
    let emails = resource.unit("emails").unwrap().value.clone();
    let rendered = Format::Ftl.render_candidate("emails", &emails);
    assert_eq!(
        rendered,
        "emails =\n    { $count ->\n        [one] One email\n       *[other] { $count } emails\n    }\n"
    );
    let again = parse(&rendered);
    assert_eq!(again.unit("emails").unwrap().value, emails);
}

#[test]
fn attributes_render_indented() {
    let resource = parse(FTL);
    let brand = resource.unit("-brand").unwrap().value.clone();
    assert_eq!(
        Format::Ftl.render_candidate("-brand", &brand),
        "-brand = Firefox\n    .gender = masculine\n"
    );
}
