use std::io::{Cursor, Read, Write};

use odfill::{fill_odt_template, odt_text_content, value, Engine, ErrorKind, Image};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const ODT_MIMETYPE: &str = "application/vnd.oasis.opendocument.text";

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.3">
   <manifest:file-entry manifest:full-path="/" manifest:version="1.3" manifest:media-type="application/vnd.oasis.opendocument.text"/>
   <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
   <manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>
   <manifest:file-entry manifest:full-path="settings.xml" manifest:media-type="text/xml"/>
</manifest:manifest>"#;

fn content_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" xmlns:draw="urn:oasis:names:tc:opendocument:xmlns:drawing:1.0" xmlns:xlink="http://www.w3.org/1999/xlink" office:version="1.3"><office:body><office:text>{body}</office:text></office:body></office:document-content>"#
    )
}

fn paragraph(text: &str) -> String {
    format!("<text:p>{text}</text:p>")
}

fn build_odt(body: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file("mimetype", stored).unwrap();
    writer.write_all(ODT_MIMETYPE.as_bytes()).unwrap();
    writer.start_file("content.xml", deflated).unwrap();
    writer.write_all(content_xml(body).as_bytes()).unwrap();
    writer.start_file("styles.xml", deflated).unwrap();
    writer
        .write_all(b"<office:document-styles xmlns:office=\"urn:oasis:names:tc:opendocument:xmlns:office:1.0\"/>")
        .unwrap();
    writer.start_file("settings.xml", deflated).unwrap();
    writer
        .write_all(b"<office:document-settings xmlns:office=\"urn:oasis:names:tc:opendocument:xmlns:office:1.0\"/>")
        .unwrap();
    writer.start_file("META-INF/manifest.xml", deflated).unwrap();
    writer.write_all(MANIFEST.as_bytes()).unwrap();

    writer.finish().unwrap().into_inner()
}

fn entry_names(odt: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(odt)).unwrap();
    archive.file_names().map(str::to_owned).collect()
}

fn entry_string(odt: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(odt)).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    text
}

fn entry_bytes(odt: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(odt)).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).unwrap();
    bytes
}

#[test]
fn template_without_markers_passes_through() {
    let odt = build_odt(&paragraph("Bonjour !"));
    let filled = fill_odt_template(&odt, value!({})).unwrap();
    assert_eq!(odt_text_content(&filled).unwrap(), "Bonjour !\n");
}

#[test]
fn mimetype_entry_comes_first_and_uncompressed() {
    let odt = build_odt(&paragraph("Bonjour !"));
    let filled = fill_odt_template(&odt, value!({})).unwrap();

    let mut archive = ZipArchive::new(Cursor::new(filled.as_slice())).unwrap();
    let first = archive.by_index(0).unwrap();
    assert_eq!(first.name(), "mimetype");
    assert_eq!(first.compression(), CompressionMethod::Stored);
}

#[test]
fn output_drops_files_outside_the_kept_set() {
    let odt = build_odt(&paragraph("Bonjour !"));
    let filled = fill_odt_template(&odt, value!({})).unwrap();

    let names = entry_names(&filled);
    assert!(names.iter().any(|n| n == "styles.xml"));
    assert!(!names.iter().any(|n| n == "settings.xml"));

    let manifest = entry_string(&filled, "META-INF/manifest.xml");
    assert!(manifest.contains(r#"manifest:full-path="styles.xml""#));
    assert!(!manifest.contains("settings.xml"));
}

#[test]
fn fills_a_variable() {
    let odt = build_odt(&paragraph("Yo {nom} !"));
    let data = value! {{ nom: "David Bruant" }};
    let filled = fill_odt_template(&odt, data).unwrap();
    assert_eq!(odt_text_content(&filled).unwrap(), "Yo David Bruant !\n");
}

#[test]
fn fills_a_marker_split_by_formatting() {
    // the marker is fragmented by character style spans
    let body = "<text:p>Yo {<text:span text:style-name=\"T1\">no</text:span><text:span text:style-name=\"T2\">m</text:span>} !</text:p>";
    let odt = build_odt(body);
    let data = value! {{ nom: "David Bruant" }};
    let filled = fill_odt_template(&odt, data).unwrap();
    assert_eq!(odt_text_content(&filled).unwrap(), "Yo David Bruant !\n");
}

#[test]
fn each_repeats_its_content() {
    let body = [
        paragraph("{#each courses as course}"),
        paragraph("{course}"),
        paragraph("{/each}"),
    ]
    .concat();
    let odt = build_odt(&body);
    let data = value! {{ courses: ["Radis", "Pâtes", "Café"] }};
    let filled = fill_odt_template(&odt, data).unwrap();
    assert_eq!(odt_text_content(&filled).unwrap(), "Radis\nPâtes\nCafé\n");
}

#[test]
fn empty_each_leaves_no_content() {
    let body = [
        paragraph("avant"),
        paragraph("{#each courses as course}"),
        paragraph("{course}"),
        paragraph("{/each}"),
        paragraph("après"),
    ]
    .concat();
    let odt = build_odt(&body);
    let data = value! {{ courses: [] }};
    let filled = fill_odt_template(&odt, data).unwrap();
    assert_eq!(odt_text_content(&filled).unwrap(), "avant\naprès\n");
}

#[test]
fn each_over_a_non_iterable_loops_zero_times() {
    let body = [
        paragraph("{#each courses as course}"),
        paragraph("{course}"),
        paragraph("{/each}"),
    ]
    .concat();
    let odt = build_odt(&body);
    let data = value! {{ courses: "houlala" }};
    let filled = fill_odt_template(&odt, data).unwrap();
    assert_eq!(odt_text_content(&filled).unwrap(), "");
}

#[test]
fn text_around_block_markers_appears_once() {
    let body = [
        paragraph("liste : {#each courses as course}"),
        paragraph("{course}"),
        paragraph("{/each} (fin)"),
    ]
    .concat();
    let odt = build_odt(&body);
    let data = value! {{ courses: ["a", "b"] }};
    let filled = fill_odt_template(&odt, data).unwrap();
    assert_eq!(
        odt_text_content(&filled).unwrap(),
        "liste : \na\nb\n (fin)\n"
    );
}

#[test]
fn if_keeps_the_matching_branch() {
    // `<` is escaped the way a word processor saves it
    let body = [
        paragraph("{#if n &lt; 5}"),
        paragraph("petit"),
        paragraph("{:else}"),
        paragraph("grand"),
        paragraph("{/if}"),
    ]
    .concat();

    let odt = build_odt(&body);
    let filled = fill_odt_template(&odt, value! {{ n: 3 }}).unwrap();
    assert_eq!(odt_text_content(&filled).unwrap(), "petit\n");

    let odt = build_odt(&body);
    let filled = fill_odt_template(&odt, value! {{ n: 8 }}).unwrap();
    assert_eq!(odt_text_content(&filled).unwrap(), "grand\n");
}

#[test]
fn nested_each_blocks() {
    let body = [
        paragraph("{#each commandes as commande}"),
        paragraph("{commande.client}"),
        paragraph("{#each commande.articles as article}"),
        paragraph("* {article}"),
        paragraph("{/each}"),
        paragraph("{/each}"),
    ]
    .concat();
    let odt = build_odt(&body);
    let data = value! {{
        commandes: [
            { client: "Ada", articles: ["x", "y"] },
            { client: "Grace", articles: [] },
        ],
    }};
    let filled = fill_odt_template(&odt, data).unwrap();
    assert_eq!(
        odt_text_content(&filled).unwrap(),
        "Ada\n* x\n* y\nGrace\n"
    );
}

#[test]
fn unbalanced_closing_marker_is_a_template_error() {
    let odt = build_odt(&paragraph("{/each}"));
    let err = fill_odt_template(&odt, value!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Template);
}

#[test]
fn image_marker_embeds_the_image() {
    let odt = build_odt(&paragraph("photo : {#image photo}"));
    let content = vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
    let image = Image {
        name: String::from("chat.png"),
        media_type: String::from("image/png"),
        content: content.clone(),
    };
    let data = value! {{ photo: image }};
    let filled = fill_odt_template(&odt, data).unwrap();

    assert_eq!(entry_bytes(&filled, "Pictures/chat.png"), content);

    let manifest = entry_string(&filled, "META-INF/manifest.xml");
    assert!(manifest.contains(r#"manifest:full-path="Pictures/chat.png""#));
    assert!(manifest.contains(r#"manifest:media-type="image/png""#));

    let content_xml = entry_string(&filled, "content.xml");
    assert!(content_xml.contains("<draw:frame"));
    assert!(content_xml.contains(r#"xlink:href="Pictures/chat.png""#));
}

#[test]
fn missing_manifest_is_a_manifest_error() {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    writer.start_file("mimetype", options).unwrap();
    writer.write_all(ODT_MIMETYPE.as_bytes()).unwrap();
    writer.start_file("content.xml", options).unwrap();
    writer
        .write_all(content_xml(&paragraph("Bonjour !")).as_bytes())
        .unwrap();
    let odt = writer.finish().unwrap().into_inner();

    let err = fill_odt_template(&odt, value!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Manifest);
}

#[test]
fn fills_from_serializable_data() {
    #[derive(serde::Serialize)]
    struct Lettre {
        nom: String,
        n: u32,
    }

    let body = [
        paragraph("Yo {nom} !"),
        paragraph("{#if n &lt; 5}"),
        paragraph("petit"),
        paragraph("{/if}"),
    ]
    .concat();
    let odt = build_odt(&body);
    let data = Lettre {
        nom: String::from("David Bruant"),
        n: 3,
    };
    let filled = Engine::new().fill(&odt, data).unwrap();
    assert_eq!(
        odt_text_content(&filled).unwrap(),
        "Yo David Bruant !\npetit\n"
    );
}

#[test]
fn text_content_prefixes_list_items() {
    let body = "<text:list><text:list-item><text:p>Radis</text:p></text:list-item>\
                <text:list-item><text:p>Pâtes</text:p></text:list-item></text:list>";
    let odt = build_odt(body);
    assert_eq!(odt_text_content(&odt).unwrap(), "- Radis\n- Pâtes\n");
}

#[test]
fn substitutes_inside_attribute_values() {
    let body = "<text:p><text:a xlink:href=\"https://exemple.fr/{page}\">lien</text:a></text:p>";
    let odt = build_odt(body);
    let data = value! {{ page: "accueil" }};
    let filled = fill_odt_template(&odt, data).unwrap();
    let content = entry_string(&filled, "content.xml");
    assert!(content.contains(r#"xlink:href="https://exemple.fr/accueil""#));
}
