use locsync_formats::{Format, FormatContext, FormatError, KEY_SEPARATOR, ParsedResource};
use locsync_types::{Locale, Message, PlaceholderKind, PluralCategory};
use pretty_assertions::assert_eq;

fn parse(format: Format, text: &str) -> ParsedResource {
    format.parse(text.as_bytes(), &FormatContext::default()).unwrap()
}

fn render(format: Format, resource: &ParsedResource) -> String {
    String::from_utf8(format.serialize(resource, &FormatContext::default())).unwrap()
}

fn value(resource: &ParsedResource, key: &str) -> String {
    resource.unit(key).unwrap().value.to_plain_text()
}

// ── Format detection ──────────────────────────────────────────────

#[test]
fn format_from_path() {
    use std::path::Path;
    assert_eq!(Format::from_path(Path::new("locale/de/app.po")), Some(Format::Po));
    assert_eq!(Format::from_path(Path::new("templates/app.pot")), Some(Format::Po));
    assert_eq!(Format::from_path(Path::new("browser/main.ftl")), Some(Format::Ftl));
    assert_eq!(Format::from_path(Path::new("res/values/strings.xml")), Some(Format::AndroidXml));
    assert_eq!(Format::from_path(Path::new("_locales/en/messages.json")), Some(Format::WebExtJson));
    assert_eq!(Format::from_path(Path::new("package.json")), None);
    assert_eq!(Format::from_path(Path::new("README")), None);
}

#[test]
fn format_names_roundtrip() {
    for format in Format::ALL {
        assert_eq!(format.as_str().parse::<Format>().unwrap(), format);
    }
    assert!("yaml".parse::<Format>().is_err());
}

#[test]
fn invalid_utf8_is_an_encoding_error() {
    let err = Format::Po.parse(&[0xff, 0xfe, 0x00], &FormatContext::default()).unwrap_err();
    assert!(matches!(err, FormatError::Encoding { .. }));
}

#[test]
fn byte_order_mark_survives_modification() {
    let mut resource = parse(Format::Properties, "\u{feff}a = b\n");
    assert_eq!(value(&resource, "a"), "b");
    assert_eq!(render(Format::Properties, &resource), "\u{feff}a = b\n");
    resource.set_value("a", Message::plain("c"));
    assert_eq!(render(Format::Properties, &resource), "\u{feff}a = c\n");
}

// ── gettext ───────────────────────────────────────────────────────

const PO: &str = r#"msgid ""
msgstr ""
"Content-Type: text/plain; charset=UTF-8\n"
"Plural-Forms: nplurals=2; plural=(n != 1);\n"

#. Button label
#: src/app.c:10
msgid "Save"
msgstr "Speichern"

#, fuzzy
msgid "Open"
msgstr "Offnen"

msgctxt "menu"
msgid "File"
msgstr ""

msgid "%d file"
msgid_plural "%d files"
msgstr[0] "%d Datei"
msgstr[1] "%d Dateien"

#~ msgid "Old"
#~ msgstr "Alt"
"#;

#[test]
fn po_parses_units() {
    let resource = parse(Format::Po, PO);
    let keys: Vec<&str> = resource.units().map(|u| u.key.as_str()).collect();
    let menu_file = format!("menu{KEY_SEPARATOR}File");
    assert_eq!(keys, vec!["Save", "Open", menu_file.as_str(), "%d file"]);

    let save = resource.unit("Save").unwrap();
    assert_eq!(save.comment.as_deref(), Some("Button label"));
    assert_eq!(save.source.as_ref().unwrap().to_plain_text(), "Save");
    assert!(resource.unit("Open").unwrap().has_flag("fuzzy"));
    assert!(resource.unit(&menu_file).unwrap().value.is_empty());
}

#[test]
fn po_plural_maps_to_locale_categories() {
    let ctx = FormatContext::for_locale(Locale::new("de"));
    let resource = Format::Po.parse(PO.as_bytes(), &ctx).unwrap();
    let unit = resource.unit("%d file").unwrap();
    let select = unit.value.as_plural().unwrap();
    assert_eq!(select.variant(PluralCategory::One.as_str()).unwrap().to_plain_text(), "%d Datei");
    assert_eq!(select.catch_all().unwrap().value.to_plain_text(), "%d Dateien");
    assert_eq!(unit.value.placeholders()[0].kind, PlaceholderKind::Printf);
    assert!(unit.source.as_ref().unwrap().as_plural().is_some());
}

#[test]
fn po_roundtrip_is_byte_identical() {
    let resource = parse(Format::Po, PO);
    assert_eq!(render(Format::Po, &resource), PO);
}

#[test]
fn po_splices_only_the_changed_msgstr() {
    let mut resource = parse(Format::Po, PO);
    resource.set_value("Save", Message::plain("Sichern"));
    resource.set_value(&format!("menu{KEY_SEPARATOR}File"), Message::plain("Datei"));
    let expected = PO
        .replace("msgstr \"Speichern\"", "msgstr \"Sichern\"")
        .replace("msgid \"File\"\nmsgstr \"\"", "msgid \"File\"\nmsgstr \"Datei\"");
    assert_eq!(render(Format::Po, &resource), expected);
}

#[test]
fn po_new_translation_clears_fuzzy() {
    let mut resource = parse(Format::Po, PO);
    resource.set_value("Open", Message::plain("Öffnen"));
    let out = render(Format::Po, &resource);
    assert!(out.contains("\nmsgid \"Open\"\nmsgstr \"Öffnen\"\n"));
    assert!(!out.contains("fuzzy"));
}

#[test]
fn po_multiline_values_wrap_and_reparse() {
    let mut resource = parse(Format::Po, PO);
    resource.set_value("Save", Message::plain("Line one\nLine two"));
    let out = render(Format::Po, &resource);
    assert!(out.contains("msgstr \"\"\n\"Line one\\n\"\n\"Line two\"\n"));
    let again = parse(Format::Po, &out);
    assert_eq!(value(&again, "Save"), "Line one\nLine two");
}

#[test]
fn po_rejects_unknown_keywords() {
    let err = Format::Po
        .parse(b"msgid \"a\"\nmsgfoo \"b\"\n", &FormatContext::default())
        .unwrap_err();
    assert!(matches!(err, FormatError::Parse { line: 2, .. }));
}

// ── Java properties ───────────────────────────────────────────────

#[test]
fn properties_parse_and_splice() {
    let text = "# Greeting\nhello = Hello {0}\nbye=Bye\n\n! other\nempty=\n";
    let mut resource = parse(Format::Properties, text);
    assert_eq!(resource.unit("hello").unwrap().comment.as_deref(), Some("Greeting"));
    assert_eq!(resource.unit("hello").unwrap().value.placeholders()[0].kind, PlaceholderKind::Brace);
    assert_eq!(value(&resource, "bye"), "Bye");
    assert_eq!(resource.unit("empty").unwrap().comment.as_deref(), Some("other"));
    assert!(resource.unit("empty").unwrap().value.is_empty());

    resource.set_value("bye", Message::plain("Tschüss"));
    resource.set_value("empty", Message::plain("leer"));
    assert_eq!(
        render(Format::Properties, &resource),
        "# Greeting\nhello = Hello {0}\nbye=Tschüss\n\n! other\nempty=leer\n"
    );
}

#[test]
fn properties_escapes_and_continuations() {
    let text = "path = C:\\\\dir\\n\nmulti = first \\\n    second\nuni = caf\\u00e9\n";
    let mut resource = parse(Format::Properties, text);
    assert_eq!(value(&resource, "path"), "C:\\dir\n");
    assert_eq!(value(&resource, "multi"), "first second");
    assert_eq!(value(&resource, "uni"), "café");
    assert_eq!(render(Format::Properties, &resource), text);

    resource.set_value("multi", Message::plain("one\ttwo"));
    assert_eq!(
        render(Format::Properties, &resource),
        "path = C:\\\\dir\\n\nmulti = one\\ttwo\nuni = caf\\u00e9\n"
    );
}

#[test]
fn properties_preserves_crlf() {
    let text = "a = A\r\nb = B\r\n";
    let mut resource = parse(Format::Properties, text);
    resource.set_value("a", Message::plain("X"));
    assert_eq!(render(Format::Properties, &resource), "a = X\r\nb = B\r\n");
}

#[test]
fn properties_form_feed_separates_key_and_value() {
    let text = "title\u{c}Fenster\nname =\u{c}Wert\n";
    let resource = parse(Format::Properties, text);
    assert_eq!(value(&resource, "title"), "Fenster");
    assert_eq!(value(&resource, "name"), "Wert");
    assert_eq!(render(Format::Properties, &resource), text);
}

// ── INI ───────────────────────────────────────────────────────────

#[test]
fn ini_sections_qualify_keys() {
    let text = "[Strings]\n; Window title\ntitle=Installer %s\n[Other]\nname = Value\n";
    let mut resource = parse(Format::Ini, text);
    assert_eq!(resource.unit("title").unwrap().comment.as_deref(), Some("Window title"));
    assert_eq!(value(&resource, "Other.name"), "Value");
    assert_eq!(render(Format::Ini, &resource), text);

    resource.set_value("title", Message::plain("Setup %s"));
    assert_eq!(
        render(Format::Ini, &resource),
        "[Strings]\n; Window title\ntitle=Setup %s\n[Other]\nname = Value\n"
    );
}

// ── .lang ─────────────────────────────────────────────────────────

const LANG: &str = "## active ##\n# MAX_LENGTH: 20\n;Hello\nBonjour\n\n;Same\nSame {ok}\n\n;Untranslated\nUntranslated\n";

#[test]
fn lang_ok_marker_and_untranslated() {
    let resource = parse(Format::Lang, LANG);
    assert_eq!(value(&resource, "Hello"), "Bonjour");
    assert_eq!(resource.unit("Hello").unwrap().comment.as_deref(), Some("MAX_LENGTH: 20"));
    assert_eq!(value(&resource, "Same"), "Same");
    assert!(resource.unit("Same").unwrap().has_flag("ok"));
    assert!(resource.unit("Untranslated").unwrap().value.is_empty());
    assert_eq!(render(Format::Lang, &resource), LANG);
}

#[test]
fn lang_renders_source_for_empty_values() {
    let mut resource = parse(Format::Lang, LANG);
    resource.set_value("Untranslated", Message::plain("Non traduit"));
    resource.set_value("Hello", Message::default());
    resource.set_value("Same", Message::plain("Pareil"));
    assert_eq!(
        render(Format::Lang, &resource),
        "## active ##\n# MAX_LENGTH: 20\n;Hello\nHello\n\n;Same\nPareil\n\n;Untranslated\nNon traduit\n"
    );
}

// ── DTD ───────────────────────────────────────────────────────────

const DTD: &str = "<!-- LOCALIZATION NOTE: brand -->\n<!ENTITY app.title \"&brandShortName; Settings\">\n<!ENTITY app.quote 'It&apos;s here'>\n%brandDTD;\n";

#[test]
fn dtd_entities_and_references() {
    let resource = parse(Format::Dtd, DTD);
    let title = resource.unit("app.title").unwrap();
    assert_eq!(title.comment.as_deref(), Some("LOCALIZATION NOTE: brand"));
    assert_eq!(title.value.placeholders()[0].raw, "&brandShortName;");
    assert_eq!(title.value.placeholders()[0].kind, PlaceholderKind::Reference);
    assert_eq!(value(&resource, "app.quote"), "It's here");
    assert_eq!(render(Format::Dtd, &resource), DTD);
}

#[test]
fn dtd_escapes_the_quote_in_use() {
    let mut resource = parse(Format::Dtd, DTD);
    resource.set_value("app.title", Message::plain("Say \"hi\""));
    resource.set_value("app.quote", Message::plain("Don't"));
    let out = render(Format::Dtd, &resource);
    assert!(out.contains("<!ENTITY app.title \"Say &quot;hi&quot;\">"));
    assert!(out.contains("<!ENTITY app.quote 'Don&apos;t'>"));
}

#[test]
fn dtd_unterminated_value_is_an_error() {
    let err = Format::Dtd
        .parse(b"\n<!ENTITY a \"open>\n", &FormatContext::default())
        .unwrap_err();
    assert!(matches!(err, FormatError::Parse { line: 2, .. }));
}

// ── Apple .strings ────────────────────────────────────────────────

#[test]
fn apple_strings_roundtrip_and_splice() {
    let text = "/* Button */\n\"save\" = \"Save %@\";\n\"quote\" = \"He said \\\"hi\\\"\";\n";
    let mut resource = parse(Format::AppleStrings, text);
    assert_eq!(resource.unit("save").unwrap().comment.as_deref(), Some("Button"));
    assert_eq!(value(&resource, "quote"), "He said \"hi\"");
    assert_eq!(render(Format::AppleStrings, &resource), text);

    resource.set_value("save", Message::plain("Sichern %@"));
    assert_eq!(
        render(Format::AppleStrings, &resource),
        "/* Button */\n\"save\" = \"Sichern %@\";\n\"quote\" = \"He said \\\"hi\\\"\";\n"
    );
}

#[test]
fn apple_strings_missing_semicolon() {
    let err = Format::AppleStrings
        .parse(b"\"a\" = \"b\"\n", &FormatContext::default())
        .unwrap_err();
    assert!(matches!(err, FormatError::Parse { .. }));
}
