//! XLIFF 1.2 documents.
//!
//! Unit keys are `file-original` + [`KEY_SEPARATOR`] + `trans-unit id`. A
//! unit without a `<target>` gets one inserted after its `</source>` when
//! a translation is written.

use crate::placeholders::{self, Rule};
use crate::resource::RawSpan;
use crate::text;
use crate::xml;
use crate::{
    Format, FormatAdapter, FormatContext, FormatError, FormatResult, KEY_SEPARATOR, ParsedResource,
    Unit, Untranslated,
};
use locsync_types::{Message, Pattern};
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use std::ops::Range;

const RULES: &[Rule] = &[Rule::Printf];
const FORMAT: Format = Format::Xliff;

pub(crate) struct Xliff;

fn value_pattern(raw: &str) -> Pattern {
    placeholders::markup_pattern(raw, RULES, &xml::unescape)
}

fn render_pattern(pattern: &Pattern) -> String {
    text::render_flat(pattern, &xml::escape_text)
}

/// Where a unit's target text lives, relative to the document.
enum Target {
    Inner(Range<usize>),
    Empty(Range<usize>),
    Missing { after_source: usize, indent: String },
}

impl FormatAdapter for Xliff {
    fn parse(&self, text: &str, _ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let mut reader = Reader::from_str(text);
        let mut resource = ParsedResource::new(FORMAT);
        let mut cursor = 0;
        let mut file = String::new();
        let mut closing = None;
        let err = |pos: usize, e: &dyn std::fmt::Display| FormatError::at(FORMAT, text, pos, e.to_string());
        loop {
            let start = reader.buffer_position() as usize;
            match reader.read_event().map_err(|e| err(start, &e))? {
                Event::Eof => break,
                Event::Start(e) if e.name().as_ref() == b"file" => {
                    file = xml::attribute(FORMAT, text, start, &e, "original")?.unwrap_or_default();
                }
                Event::End(e) if e.name().as_ref() == b"body" => closing = Some(start),
                Event::Start(e) if e.name().as_ref() == b"trans-unit" => {
                    let id = xml::attribute(FORMAT, text, start, &e, "id")?
                        .ok_or_else(|| FormatError::at(FORMAT, text, start, "trans-unit without an id"))?;
                    let mut source = None;
                    let mut target = None;
                    let mut note = None;
                    loop {
                        let pos = reader.buffer_position() as usize;
                        match reader.read_event().map_err(|e| err(pos, &e))? {
                            Event::Start(child) => {
                                let name = child.name().as_ref().to_vec();
                                let span = reader.read_to_end(QName(&name)).map_err(|e| err(pos, &e))?;
                                let inner = span.start as usize..span.end as usize;
                                match name.as_slice() {
                                    b"source" => {
                                        let after = reader.buffer_position() as usize;
                                        source = Some(value_pattern(&text[inner]));
                                        target.get_or_insert(Target::Missing {
                                            after_source: after,
                                            indent: xml::line_indent(text, pos).to_string(),
                                        });
                                    }
                                    b"target" => target = Some(Target::Inner(inner)),
                                    b"note" => note = Some(xml::unescape(&text[inner]).trim().to_string()),
                                    _ => {}
                                }
                            }
                            Event::Empty(child) if child.name().as_ref() == b"target" => {
                                target = Some(Target::Empty(pos..reader.buffer_position() as usize));
                            }
                            Event::End(end) if end.name().as_ref() == b"trans-unit" => break,
                            Event::Eof => {
                                return Err(FormatError::at(FORMAT, text, start, "unterminated trans-unit"));
                            }
                            _ => {}
                        }
                    }
                    let end = reader.buffer_position() as usize;
                    let source = source
                        .ok_or_else(|| FormatError::at(FORMAT, text, start, "trans-unit without a source"))?;
                    let (value, span) = match target {
                        Some(Target::Inner(range)) => (
                            value_pattern(&text[range.clone()]),
                            RawSpan::new(&text[start..end], Some((range.start - start)..(range.end - start))),
                        ),
                        Some(Target::Empty(range)) => {
                            let mut span = RawSpan::new(&text[start..end], Some((range.start - start)..(range.end - start)));
                            span.wrap = Some(("<target>".to_string(), "</target>".to_string()));
                            (Pattern::new(), span)
                        }
                        Some(Target::Missing { after_source, indent }) => {
                            let at = after_source - start;
                            let mut span = RawSpan::new(&text[start..end], Some(at..at));
                            span.wrap = Some((format!("\n{indent}<target>"), "</target>".to_string()));
                            (Pattern::new(), span)
                        }
                        None => (Pattern::new(), RawSpan::new(&text[start..end], None)),
                    };
                    resource.push_raw(&text[cursor..start]);
                    let unit = Unit::parsed(format!("{file}{KEY_SEPARATOR}{id}"), Message::from_pattern(value), span)
                        .with_source(Message::from_pattern(source))
                        .with_comment(note);
                    resource.push_parsed(unit);
                    cursor = end;
                }
                _ => {}
            }
        }
        xml::push_tail(&mut resource, text, cursor, closing);
        Ok(resource)
    }

    fn render_value(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        render_pattern(&unit.value.pattern)
    }

    fn render_unit(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        let id = unit
            .key
            .split_once(KEY_SEPARATOR)
            .map_or(unit.key.as_str(), |(_, id)| id);
        let source = unit
            .source
            .as_ref()
            .map(|s| render_pattern(&s.pattern))
            .unwrap_or_default();
        let mut out = format!("      <trans-unit id=\"{}\">\n", xml::escape_attr(id));
        out.push_str(&format!("        <source>{source}</source>\n"));
        out.push_str(&format!(
            "        <target>{}</target>\n",
            render_pattern(&unit.value.pattern)
        ));
        if let Some(note) = &unit.comment {
            out.push_str(&format!("        <note>{}</note>\n", xml::escape_text(note)));
        }
        out.push_str("      </trans-unit>\n");
        out
    }

    fn can_splice(&self, _unit: &Unit) -> bool {
        true
    }

    fn untranslated(&self) -> Untranslated {
        Untranslated::KeepEmpty
    }
}
