//! WordprocessingML builders shared by unit tests across the crate.

use std::io::Write;

use super::xml::escape_text;

pub fn body(parts: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordml"><w:body>{}<w:sectPr/></w:body></w:document>"#,
        parts.concat()
    )
}

pub fn para(text: &str) -> String {
    if text.is_empty() {
        return "<w:p><w:pPr><w:spacing w:after=\"0\"/></w:pPr></w:p>".to_string();
    }
    format!(
        r#"<w:p><w:pPr><w:jc w:val="left"/></w:pPr><w:r><w:rPr><w:sz w:val="20"/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape_text(text)
    )
}

/// Paragraph whose text is split over several runs.
pub fn split_para(pieces: &[&str]) -> String {
    let runs: String = pieces
        .iter()
        .map(|p| format!(r#"<w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#, escape_text(p)))
        .collect();
    format!("<w:p>{runs}</w:p>")
}

pub fn cell_row(cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|c| format!(r#"<w:tc><w:tcPr><w:tcW w:w="2000" w:type="dxa"/></w:tcPr>{}</w:tc>"#, para(c)))
        .collect();
    format!("<w:tr>{cells}</w:tr>")
}

pub fn table(rows: &[String]) -> String {
    format!(
        r#"<w:tbl><w:tblPr><w:tblStyle w:val="Grille"/></w:tblPr><w:tblGrid/>{}</w:tbl>"#,
        rows.concat()
    )
}

pub fn legacy_checkbox(checked: bool, label: &str) -> String {
    format!(
        r#"<w:p><w:r><w:fldChar w:fldCharType="begin"><w:ffData><w:name w:val="CaseACocher1"/><w:enabled/><w:checkBox><w:sizeAuto/><w:default w:val="{}"/></w:checkBox></w:ffData></w:fldChar></w:r><w:r><w:instrText xml:space="preserve"> FORMCHECKBOX </w:instrText></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r><w:r><w:t xml:space="preserve"> {}</w:t></w:r></w:p>"#,
        if checked { 1 } else { 0 },
        escape_text(label)
    )
}

pub fn checkbox_content_control(checked: bool, label: &str) -> String {
    format!(
        r#"<w:p><w:sdt><w:sdtPr><w14:checkbox><w14:checked w14:val="{}"/><w14:checkedState w14:val="2612" w14:font="MS Gothic"/><w14:uncheckedState w14:val="2610" w14:font="MS Gothic"/></w14:checkbox></w:sdtPr><w:sdtContent><w:r><w:t>{}</w:t></w:r></w:sdtContent></w:sdt><w:r><w:t xml:space="preserve"> {}</w:t></w:r></w:p>"#,
        if checked { 1 } else { 0 },
        if checked { '☒' } else { '☐' },
        escape_text(label)
    )
}

/// In-memory `.docx` with a content-types part, a styles part and the given main part.
pub fn docx_bytes(document_xml: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", r#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#),
        ("word/styles.xml", r#"<?xml version="1.0"?><w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"/>"#),
        ("word/document.xml", document_xml),
    ];
    for (name, content) in parts {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
