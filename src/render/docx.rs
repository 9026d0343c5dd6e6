//! DOCX writer: a minimal WordprocessingML package built with `zip`.
//!
//! Package layout:
//!
//! ```text
//! [Content_Types].xml
//! _rels/.rels
//! docProps/core.xml            title
//! word/_rels/document.xml.rels
//! word/document.xml
//! word/styles.xml              Title, Heading1..3
//! ```
//!
//! Lists are written as indented paragraphs with literal `1.` markers, so no
//! numbering part is needed. Photos are listed by file name; they are not
//! embedded in flow formats.

use super::flow::FlowBlock;
use crate::error::ComposeError;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault></w:docDefaults>
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:pPr><w:spacing w:after="120"/></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:pPr><w:spacing w:after="240"/></w:pPr><w:rPr><w:b/><w:sz w:val="52"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="360" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="36"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="80"/><w:outlineLvl w:val="1"/></w:pPr><w:rPr><w:b/><w:sz w:val="28"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading3"><w:name w:val="heading 3"/><w:basedOn w:val="Normal"/><w:pPr><w:keepNext/><w:outlineLvl w:val="2"/></w:pPr><w:rPr><w:b/><w:sz w:val="24"/></w:rPr></w:style>
</w:styles>"#;

/// Build a `.docx` package from flow blocks.
pub fn write_docx(title: &str, blocks: &[FlowBlock]) -> Result<Vec<u8>, ComposeError> {
    let document = document_xml(blocks);
    let core = core_xml(title);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, &str); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("docProps/core.xml", core.as_str()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS),
        ("word/document.xml", document.as_str()),
        ("word/styles.xml", STYLES),
    ];
    for (name, body) in parts {
        zip.start_file(name, options).map_err(package_error)?;
        zip.write_all(body.as_bytes()).map_err(|e| ComposeError::DocumentWrite {
            format: "DOCX".into(),
            detail: format!("writing {name}: {e}"),
        })?;
    }

    let cursor = zip.finish().map_err(package_error)?;
    Ok(cursor.into_inner())
}

fn package_error(e: zip::result::ZipError) -> ComposeError {
    ComposeError::DocumentWrite {
        format: "DOCX".into(),
        detail: e.to_string(),
    }
}

fn document_xml(blocks: &[FlowBlock]) -> String {
    let mut body = String::new();
    for block in blocks {
        match block {
            FlowBlock::Heading { level, text } => {
                let style = match level {
                    1 => "Title",
                    2 => "Heading1",
                    3 => "Heading2",
                    _ => "Heading3",
                };
                body.push_str(&paragraph(Some(style), None, &run(text, false, false)));
            }
            FlowBlock::Paragraph(text) => {
                body.push_str(&paragraph(None, None, &run(text, false, false)));
            }
            FlowBlock::Field { label, value } => {
                let mut runs = run(&format!("{label}: "), true, false);
                if !value.is_empty() {
                    runs.push_str(&run(value, false, false));
                }
                body.push_str(&paragraph(None, None, &runs));
            }
            FlowBlock::List { ordered, items } => {
                for (i, item) in items.iter().enumerate() {
                    let marker = if *ordered {
                        format!("{}.\t", i + 1)
                    } else {
                        "\u{2022}\t".to_string()
                    };
                    body.push_str(&paragraph(
                        None,
                        Some(360),
                        &run(&format!("{marker}{item}"), false, false),
                    ));
                }
            }
            FlowBlock::Image { caption, .. } => {
                body.push_str(&paragraph(
                    None,
                    None,
                    &run(&format!("[Photo: {caption}]"), false, true),
                ));
            }
        }
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1134" w:right="1134" w:bottom="1134" w:left="1134" w:header="709" w:footer="709" w:gutter="0"/></w:sectPr></w:body></w:document>"#
    )
}

fn core_xml(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{}</dc:title><dc:creator>report-composer</dc:creator></cp:coreProperties>"#,
        escape_xml(title)
    )
}

fn paragraph(style: Option<&str>, indent: Option<u32>, runs: &str) -> String {
    let mut props = String::new();
    if let Some(style) = style {
        props.push_str(&format!(r#"<w:pStyle w:val="{style}"/>"#));
    }
    if let Some(indent) = indent {
        props.push_str(&format!(r#"<w:ind w:left="{indent}" w:hanging="360"/>"#));
    }
    if props.is_empty() {
        format!("<w:p>{runs}</w:p>")
    } else {
        format!("<w:p><w:pPr>{props}</w:pPr>{runs}</w:p>")
    }
}

/// One run; line breaks and tabs become `<w:br/>` and `<w:tab/>`.
fn run(text: &str, bold: bool, italic: bool) -> String {
    let mut props = String::new();
    if bold {
        props.push_str("<w:b/>");
    }
    if italic {
        props.push_str("<w:i/>");
    }
    let props = if props.is_empty() {
        props
    } else {
        format!("<w:rPr>{props}</w:rPr>")
    };

    let mut content = String::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            content.push_str("<w:br/>");
        }
        for (j, piece) in line.split('\t').enumerate() {
            if j > 0 {
                content.push_str("<w:tab/>");
            }
            if !piece.is_empty() {
                content.push_str(&format!(
                    r#"<w:t xml:space="preserve">{}</w:t>"#,
                    escape_xml(piece)
                ));
            }
        }
    }
    format!("<w:r>{props}{content}</w:r>")
}

/// Escape XML text, dropping characters XML 1.0 cannot carry.
fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut s = String::new();
        file.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn package_contains_required_parts() {
        let bytes = write_docx("T", &[FlowBlock::Paragraph("hello".into())]).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<_> = archive.file_names().collect();
        for part in ["[Content_Types].xml", "_rels/.rels", "word/document.xml", "word/styles.xml"] {
            assert!(names.contains(&part), "missing {part}");
        }
    }

    #[test]
    fn text_is_escaped() {
        let bytes = write_docx(
            "Q&A <night>",
            &[FlowBlock::Field {
                label: "Venue".into(),
                value: "R&D \"Lab\"".into(),
            }],
        )
        .unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains("R&amp;D &quot;Lab&quot;"));
        assert!(doc.contains("<w:b/>"));
        let core = read_part(&bytes, "docProps/core.xml");
        assert!(core.contains("Q&amp;A &lt;night&gt;"));
    }

    #[test]
    fn ordered_list_numbers_items() {
        let xml = document_xml(&[FlowBlock::List {
            ordered: true,
            items: vec!["a".into(), "b".into()],
        }]);
        assert!(xml.contains(r#"<w:t xml:space="preserve">1.</w:t><w:tab/><w:t xml:space="preserve">a</w:t>"#));
        assert!(xml.contains(r#"<w:t xml:space="preserve">2.</w:t>"#));
    }

    #[test]
    fn line_breaks_become_br() {
        assert_eq!(
            run("a\nb", false, false),
            r#"<w:r><w:t xml:space="preserve">a</w:t><w:br/><w:t xml:space="preserve">b</w:t></w:r>"#
        );
    }
}
