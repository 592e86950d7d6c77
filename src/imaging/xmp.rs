//! XMP copyright filter.
//!
//! Reduces an XMP packet to the attribution namespaces: Dublin Core
//! (`rights`, `contributor`, `creator`, `publisher` only), XMP Rights
//! Management, and Creative Commons. Kept property elements are copied
//! byte-for-byte from the source packet; each surviving `rdf:Description`
//! is re-emitted with every namespace that was in scope for it, so copied
//! fragments keep resolving their prefixes.

use roxmltree::{Document, Node};
use std::fmt::Write as _;
use thiserror::Error;

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const XMP_RIGHTS_NS: &str = "http://ns.adobe.com/xap/1.0/rights/";
const CC_NS: &str = "http://creativecommons.org/ns#";

const DC_KEEP: [&str; 4] = ["rights", "contributor", "creator", "publisher"];

#[derive(Error, Debug)]
pub enum XmpError {
    #[error("XMP packet is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("XMP parse error: {0}")]
    Xml(#[from] roxmltree::Error),
}

fn keep(namespace: Option<&str>, local: &str) -> bool {
    match namespace {
        Some(DC_NS) => DC_KEEP.contains(&local),
        Some(XMP_RIGHTS_NS) | Some(CC_NS) => true,
        _ => false,
    }
}

/// Filter an XMP packet down to its copyright properties.
///
/// Returns `Ok(None)` when nothing survives the filter.
pub fn filter_copyright(packet: &[u8]) -> Result<Option<Vec<u8>>, XmpError> {
    let text = std::str::from_utf8(packet)?.trim_end_matches(['\0', ' ', '\n', '\r', '\t']);
    let doc = Document::parse(text)?;

    let mut descriptions = String::new();
    for desc in doc
        .descendants()
        .filter(|n| n.has_tag_name((RDF_NS, "Description")))
    {
        write_description(&mut descriptions, text, desc);
    }

    if descriptions.is_empty() {
        return Ok(None);
    }

    let mut out = String::with_capacity(descriptions.len() + 256);
    out.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
    out.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    let _ = writeln!(out, "<rdf:RDF xmlns:rdf=\"{RDF_NS}\">");
    out.push_str(&descriptions);
    out.push_str("</rdf:RDF>\n</x:xmpmeta>\n<?xpacket end=\"w\"?>");
    Ok(Some(out.into_bytes()))
}

/// Append the filtered form of one `rdf:Description`, or nothing if it
/// keeps no properties.
fn write_description(out: &mut String, text: &str, desc: Node<'_, '_>) {
    let attrs: Vec<String> = desc
        .attributes()
        .filter(|a| keep(a.namespace(), a.name()))
        .filter_map(|a| {
            let prefix = desc.lookup_prefix(a.namespace()?)?;
            Some(format!("{prefix}:{}=\"{}\"", a.name(), escape(a.value())))
        })
        .collect();

    let children: Vec<&str> = desc
        .children()
        .filter(|c| c.is_element())
        .filter(|c| keep(c.tag_name().namespace(), c.tag_name().name()))
        .map(|c| &text[c.range()])
        .collect();

    if attrs.is_empty() && children.is_empty() {
        return;
    }

    let rdf = desc.lookup_prefix(RDF_NS).unwrap_or("rdf");
    let _ = write!(out, "<{rdf}:Description {rdf}:about=\"\"");
    for ns in desc.namespaces() {
        match ns.name() {
            Some("xml") => {}
            Some(prefix) => {
                let _ = write!(out, " xmlns:{prefix}=\"{}\"", escape(ns.uri()));
            }
            None => {
                let _ = write!(out, " xmlns=\"{}\"", escape(ns.uri()));
            }
        }
    }
    for attr in &attrs {
        out.push(' ');
        out.push_str(attr);
    }

    if children.is_empty() {
        out.push_str("/>\n");
        return;
    }

    out.push_str(">\n");
    for child in children {
        out.push_str(child);
        out.push('\n');
    }
    let _ = writeln!(out, "</{rdf}:Description>");
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKET: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<rdf:Description rdf:about=""
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:xmp="http://ns.adobe.com/xap/1.0/"
    xmlns:xmpRights="http://ns.adobe.com/xap/1.0/rights/"
    xmp:CreatorTool="Editor 1.0"
    xmpRights:Marked="True">
<dc:creator><rdf:Seq><rdf:li>Jane Doe</rdf:li></rdf:Seq></dc:creator>
<dc:description><rdf:Alt><rdf:li xml:lang="x-default">A lake</rdf:li></rdf:Alt></dc:description>
</rdf:Description>
</rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#;

    fn filtered(packet: &str) -> String {
        let out = filter_copyright(packet.as_bytes()).unwrap().unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn keeps_creator_and_rights_marked() {
        let out = filtered(PACKET);
        assert!(out.contains("<dc:creator><rdf:Seq><rdf:li>Jane Doe</rdf:li></rdf:Seq></dc:creator>"));
        assert!(out.contains("xmpRights:Marked=\"True\""));
        assert!(!out.contains("dc:description"));
        assert!(!out.contains("CreatorTool"));
    }

    #[test]
    fn output_is_well_formed() {
        let out = filtered(PACKET);
        let doc = Document::parse(&out).unwrap();
        let creator = doc
            .descendants()
            .find(|n| n.has_tag_name((DC_NS, "creator")))
            .unwrap();
        let li = creator
            .descendants()
            .find(|n| n.has_tag_name((RDF_NS, "li")))
            .unwrap();
        assert_eq!(li.text(), Some("Jane Doe"));
    }

    #[test]
    fn description_only_is_absent() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/">
<dc:description><rdf:Alt><rdf:li xml:lang="x-default">Only this</rdf:li></rdf:Alt></dc:description>
</rdf:Description>
</rdf:RDF>
</x:xmpmeta>"#;
        assert!(filter_copyright(packet.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn keeps_dc_attributes_and_creative_commons() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<rdf:Description rdf:about=""
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:cc="http://creativecommons.org/ns#"
    dc:publisher="Press &amp; Co"
    dc:format="image/jpeg"
    cc:license="https://creativecommons.org/licenses/by/4.0/"/>
</rdf:RDF>
</x:xmpmeta>"#;
        let out = filtered(packet);
        assert!(out.contains("dc:publisher=\"Press &amp; Co\""));
        assert!(out.contains("cc:license="));
        assert!(!out.contains("dc:format"));
    }

    #[test]
    fn tolerates_trailing_padding() {
        let mut packet = PACKET.as_bytes().to_vec();
        packet.extend_from_slice(b"\n      \0\0");
        assert!(filter_copyright(&packet).unwrap().is_some());
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(filter_copyright(b"<x:xmpmeta><rdf:RDF>").is_err());
    }
}
