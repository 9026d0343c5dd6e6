//! Markdown writer.

use super::flow::FlowBlock;
use crate::pipeline::text::{clean_markdown, escape_markdown};

/// Serialise flow blocks to a Markdown document.
pub fn write_markdown(blocks: &[FlowBlock]) -> String {
    let mut out = String::new();

    for block in blocks {
        match block {
            FlowBlock::Heading { level, text } => {
                let hashes = "#".repeat((*level).clamp(1, 6) as usize);
                out.push_str(&format!("{hashes} {}\n\n", escape_markdown(text)));
            }
            FlowBlock::Paragraph(text) => {
                out.push_str(&escape_markdown(text));
                out.push_str("\n\n");
            }
            FlowBlock::Field { label, value } => {
                if value.is_empty() {
                    out.push_str(&format!("**{}:**\n\n", escape_markdown(label)));
                } else {
                    // Backslash hard breaks survive trailing-whitespace trimming.
                    let value = escape_markdown(value).replace('\n', "\\\n");
                    out.push_str(&format!("**{}:** {}\n\n", escape_markdown(label), value));
                }
            }
            FlowBlock::List { ordered, items } => {
                for (i, item) in items.iter().enumerate() {
                    let marker = if *ordered {
                        format!("{}.", i + 1)
                    } else {
                        "-".to_string()
                    };
                    out.push_str(&format!("{marker} {}\n", escape_markdown(item)));
                }
                out.push('\n');
            }
            FlowBlock::Image { caption, reference } => {
                out.push_str(&format!(
                    "![{}](<{}>)\n\n",
                    escape_markdown(caption),
                    reference.replace('>', "%3E")
                ));
            }
        }
    }

    clean_markdown(&out)
}
