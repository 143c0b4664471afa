//! Fixture builders shared by unit tests.

use lopdf::{
    dictionary, Document, EncryptionState, EncryptionVersion, Object, Permissions, StringFormat,
};

/// A minimal PDF with `pages` blank pages and an optional `/Info` title (author "QA").
pub(crate) fn build_pdf(pages: usize, title: Option<&str>) -> Vec<u8> {
    save(pdf_document(pages, title))
}

/// Same document encrypted with RC4 (V2, 128-bit) under `user_password`.
pub(crate) fn build_encrypted_pdf(
    pages: usize,
    title: Option<&str>,
    user_password: &str,
) -> Vec<u8> {
    let mut doc = pdf_document(pages, title);
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String((0u8..16).collect(), StringFormat::Literal),
            Object::String((16u8..32).collect(), StringFormat::Literal),
        ]),
    );
    let state = EncryptionState::try_from(EncryptionVersion::V2 {
        document: &doc,
        owner_password: "owner",
        user_password,
        key_length: 128,
        permissions: Permissions::all(),
    })
    .unwrap();
    doc.encrypt(&state).unwrap();
    save(doc)
}

fn pdf_document(pages: usize, title: Option<&str>) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    for _ in 0..pages {
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if let Some(t) = title {
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(t),
            "Author" => Object::string_literal("QA"),
        });
        doc.trailer.set("Info", info_id);
    }
    doc
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
