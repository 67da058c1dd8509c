use pdf_kernel::{
    CryptMethod, Dictionary, EntryState, Name, ObjectId, PDFDocument, PDFError, PDFObject,
    PDFWriter, ReaderProperties, StandardCipher, Stream, WriterProperties,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

const CONTENT: &[u8] = b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET";

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn catalog(entries: &[(&str, PDFObject)]) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Name::from("Catalog"));
    for (key, value) in entries {
        dict.set(*key, value.clone());
    }
    dict
}

/// Catalog at 1, then one object per value
fn build_document(values: &[PDFObject]) -> (PDFDocument, Vec<ObjectId>) {
    let mut doc = PDFDocument::new();
    let root = doc.create_reference(PDFObject::Null);
    doc.register_trailer_root(root);
    let ids: Vec<ObjectId> = values.iter().map(|v| doc.create_reference(v.clone())).collect();
    let items = ids.iter().map(|&id| PDFObject::from(id)).collect::<Vec<_>>();
    doc.set_object(root, catalog(&[("Items", items.into())])).unwrap();
    (doc, ids)
}

fn sample_values() -> Vec<PDFObject> {
    let mut info = Dictionary::new();
    info.set(Name::new(&b"A B"[..]), PDFObject::real(-0.25));
    info.set("Title", PDFObject::string(&b"(nested) \\ text"[..]));
    vec![
        PDFObject::from(42i64),
        PDFObject::real(3.5),
        PDFObject::from(true),
        PDFObject::Null,
        PDFObject::string(vec![0u8, 0xff, b'\n', b')']),
        PDFObject::from(vec![PDFObject::name("X"), PDFObject::from(-7i64)]),
        PDFObject::from(info),
    ]
}

#[rstest]
#[case::classic(false)]
#[case::compressed(true)]
fn test_save_and_reload(#[case] full_compression: bool) {
    let values = sample_values();
    let (mut doc, ids) = build_document(&values);
    let stream_id = doc.create_reference(Stream::from_content(CONTENT.to_vec()));

    let props = WriterProperties::new().with_full_compression(full_compression);
    let bytes = doc.save(Vec::new(), props).unwrap();
    assert_eq!(contains(&bytes, b"/Type /XRef"), full_compression);

    let mut loaded = PDFDocument::load(bytes).unwrap();
    assert_eq!(loaded.root(), Some(ObjectId::new(1, 0)));
    for (id, value) in ids.iter().zip(&values) {
        assert_eq!(loaded.resolve(*id).unwrap(), value);
    }
    let stream = loaded.resolve(stream_id).unwrap().as_stream().unwrap();
    assert!(stream.dict().has_name("Filter", "FlateDecode"));
    assert_eq!(stream.decoded().unwrap(), CONTENT);
}

#[test_log::test]
fn test_object_streams_are_capped() {
    // 449 items plus the catalog
    let values: Vec<PDFObject> = (0..449i64).map(PDFObject::from).collect();
    let (mut doc, ids) = build_document(&values);
    assert_eq!(doc.objects_count(), 450);

    let bytes = doc
        .save(Vec::new(), WriterProperties::new().with_full_compression(true))
        .unwrap();
    let mut loaded = PDFDocument::load(bytes).unwrap();

    for number in 1..=450u32 {
        let expected = EntryState::Compressed {
            stream: 451 + (number - 1) / 200,
            index: (number - 1) % 200,
        };
        assert_eq!(loaded.xref().get(number).unwrap().state, expected, "object {}", number);
    }
    for (stream, count) in [(451, 200), (452, 200), (453, 50)] {
        let object = loaded.resolve(ObjectId::new(stream, 0)).unwrap();
        let dict = object.as_stream().unwrap().dict();
        assert!(dict.has_name("Type", "ObjStm"));
        assert_eq!(dict.get_integer("N"), Some(count));
    }
    assert!(matches!(loaded.xref().get(454).unwrap().state, EntryState::Offset(_)));
    assert_eq!(loaded.trailer().get_integer("Size"), Some(455));
    assert_eq!(loaded.resolve(ids[300]).unwrap(), &PDFObject::from(300i64));
}

#[test_log::test]
fn test_cyclic_graph_terminates() {
    let mut doc = PDFDocument::new();
    let a = doc.create_reference(Dictionary::new());
    let b = doc.create_reference(catalog(&[("Other", a.into())]));
    doc.set_object(a, catalog(&[("Other", b.into())])).unwrap();
    doc.register_trailer_root(a);

    let mut writer = PDFWriter::new(&mut doc, Vec::new(), WriterProperties::default()).unwrap();
    writer.flush(a).unwrap();
    let bytes = writer.finalize().unwrap();
    assert_eq!(bytes.windows(6).filter(|w| w == b" 0 obj").count(), 2);

    let mut loaded = PDFDocument::load(bytes).unwrap();
    let other = loaded.resolve(a).unwrap().as_dict().unwrap().get_reference("Other");
    assert_eq!(other, Some(b));
    let back = loaded.resolve(b).unwrap().as_dict().unwrap().get_reference("Other");
    assert_eq!(back, Some(a));
}

#[test_log::test]
fn test_flush_skips_unreachable_objects() {
    let mut doc = PDFDocument::new();
    let root = doc.create_reference(catalog(&[]));
    let orphan = doc.create_reference(PDFObject::from(1i64));
    doc.register_trailer_root(root);

    let mut writer = PDFWriter::new(&mut doc, Vec::new(), WriterProperties::default()).unwrap();
    writer.flush(root).unwrap();
    let bytes = writer.finalize().unwrap();

    let loaded = PDFDocument::load(bytes).unwrap();
    assert!(loaded.xref().get(orphan.number).unwrap().is_free());
    assert_eq!(loaded.objects_count(), 1);
}

#[test_log::test]
fn test_free_list_written_in_order() {
    let (mut doc, ids) = build_document(&sample_values());
    assert!(doc.delete_object(ids[1]));
    assert!(doc.delete_object(ids[4]));

    let bytes = doc.save(Vec::new(), WriterProperties::default()).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    // 0 -> 3 -> 6 -> 0, each with its bumped generation
    assert!(text.contains("0000000003 65535 f \n"));
    assert!(text.contains("0000000006 00001 f \n"));
    assert!(text.contains("0000000000 00001 f \n"));

    let mut loaded = PDFDocument::load(bytes).unwrap();
    assert!(loaded.resolve(ids[1]).unwrap().is_null());
    assert_eq!(loaded.xref().free_queue().collect::<Vec<_>>(), vec![3, 6]);
    assert_eq!(loaded.create_reference(PDFObject::Null), ObjectId::new(3, 1));
}

#[rstest]
#[case(CryptMethod::Rc4, 16)]
#[case(CryptMethod::Aes128, 16)]
#[case(CryptMethod::Aes256, 32)]
fn test_encrypted_round_trip(#[case] method: CryptMethod, #[case] key_len: usize) {
    let key = vec![0x5a; key_len];
    let (mut doc, ids) = build_document(&[PDFObject::string(&b"top secret"[..])]);
    let stream_id = doc.create_reference(Stream::from_content(CONTENT.to_vec()));

    let mut encrypt = Dictionary::new();
    encrypt.set("Filter", Name::from("Standard"));
    encrypt.set("V", 4i64);
    encrypt.set("O", PDFObject::string(&b"owner"[..]));
    let encrypt_id = doc.set_encryption(Box::new(StandardCipher::new(method, &key).unwrap()), encrypt);

    let bytes = doc.save(Vec::new(), WriterProperties::default()).unwrap();
    assert!(!contains(&bytes, b"top secret"));
    // the encryption dictionary stays readable
    assert!(contains(&bytes, b"(owner)"));

    assert!(matches!(PDFDocument::load(bytes.clone()), Err(PDFError::MissingDecryptor)));

    let props = ReaderProperties::new().with_encryption(Box::new(StandardCipher::new(method, &key).unwrap()));
    let mut loaded = PDFDocument::load_with(bytes, props).unwrap();
    assert!(loaded.is_encrypted());
    assert_eq!(loaded.resolve(ids[0]).unwrap(), &PDFObject::string(&b"top secret"[..]));
    assert_eq!(
        loaded.resolve(stream_id).unwrap().as_stream().unwrap().decoded().unwrap(),
        CONTENT
    );
    let encrypt = loaded.resolve(encrypt_id).unwrap().as_dict().unwrap();
    assert_eq!(encrypt.get("O"), Some(&PDFObject::string(&b"owner"[..])));
}

#[test_log::test]
fn test_encrypted_object_streams() {
    let key = [3u8; 16];
    let (mut doc, ids) = build_document(&[PDFObject::string(&b"packed secret"[..])]);
    doc.set_encryption(
        Box::new(StandardCipher::new(CryptMethod::Aes128, &key).unwrap()),
        Dictionary::new(),
    );
    let bytes = doc
        .save(Vec::new(), WriterProperties::new().with_full_compression(true))
        .unwrap();

    let props = ReaderProperties::new()
        .with_encryption(Box::new(StandardCipher::new(CryptMethod::Aes128, &key).unwrap()));
    let mut loaded = PDFDocument::load_with(bytes, props).unwrap();
    assert!(matches!(loaded.xref().get(ids[0].number).unwrap().state, EntryState::Compressed { .. }));
    assert_eq!(loaded.resolve(ids[0]).unwrap(), &PDFObject::string(&b"packed secret"[..]));
}

#[test_log::test]
fn test_incremental_update() {
    let values = vec![PDFObject::from(1i64), PDFObject::from(2i64), PDFObject::from(3i64)];
    let (mut doc, ids) = build_document(&values);
    let original = doc.save(Vec::new(), WriterProperties::default()).unwrap();

    let mut doc = PDFDocument::load(original.clone()).unwrap();
    let original_id = doc.trailer().get_array("ID").cloned().unwrap();
    doc.set_object(ids[0], PDFObject::from(100i64)).unwrap();
    assert!(doc.delete_object(ids[1]));
    let reused = doc.create_reference(PDFObject::string(&b"new"[..]));
    assert_eq!(reused, ObjectId::new(ids[1].number, 1));
    assert!(doc.delete_object(ids[2]));

    let updated = doc.save_incremental(Vec::new(), WriterProperties::default()).unwrap();
    assert!(updated.starts_with(&original));
    assert_eq!(updated.windows(5).filter(|w| w == b"%%EOF").count(), 2);

    let mut loaded = PDFDocument::load(updated).unwrap();
    assert_eq!(loaded.resolve(ids[0]).unwrap(), &PDFObject::from(100i64));
    assert!(loaded.resolve(ids[1]).unwrap().is_null());
    assert_eq!(loaded.resolve(reused).unwrap(), &PDFObject::string(&b"new"[..]));
    let freed = loaded.xref().get(ids[2].number).unwrap();
    assert!(freed.is_free());
    assert_eq!(freed.generation, 1);
    assert_eq!(loaded.root(), Some(ObjectId::new(1, 0)));

    let id = loaded.trailer().get_array("ID").unwrap();
    assert_eq!(id[0], original_id[0]);
    assert_ne!(id[1], original_id[1]);
}

#[test_log::test]
fn test_incremental_update_keeps_xref_stream_form() {
    let (mut doc, ids) = build_document(&[PDFObject::from(1i64), PDFObject::from(2i64)]);
    let original = doc
        .save(Vec::new(), WriterProperties::new().with_full_compression(true))
        .unwrap();

    let mut doc = PDFDocument::load(original).unwrap();
    doc.set_object(ids[1], PDFObject::name("Changed")).unwrap();
    let updated = doc.save_incremental(Vec::new(), WriterProperties::default()).unwrap();
    assert_eq!(updated.windows(11).filter(|w| w == b"/Type /XRef").count(), 2);

    let mut loaded = PDFDocument::load(updated).unwrap();
    assert_eq!(loaded.resolve(ids[1]).unwrap(), &PDFObject::name("Changed"));
    assert_eq!(loaded.resolve(ids[0]).unwrap(), &PDFObject::from(1i64));
    assert!(matches!(loaded.xref().get(ids[1].number).unwrap().state, EntryState::Offset(_)));
}

#[test_log::test]
fn test_rewrite_loaded_document() {
    let (mut doc, ids) = build_document(&sample_values());
    let compressed = doc
        .save(Vec::new(), WriterProperties::new().with_full_compression(true))
        .unwrap();

    // a full rewrite drops the old object and xref streams
    let mut doc = PDFDocument::load(compressed).unwrap();
    let classic = doc
        .save(Vec::new(), WriterProperties::new().with_release_flushed(true))
        .unwrap();
    assert!(!contains(&classic, b"/ObjStm"));
    assert!(!contains(&classic, b"/XRef"));

    let mut loaded = PDFDocument::load(classic).unwrap();
    assert_eq!(loaded.resolve(ids[0]).unwrap(), &PDFObject::from(42i64));
    assert_eq!(loaded.objects_count(), ids.len() + 1);
}

#[test_log::test]
fn test_save_to_file_and_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.pdf");

    let (mut doc, ids) = build_document(&[PDFObject::name("OnDisk")]);
    doc.save_to_file(&path, WriterProperties::default()).unwrap();

    let mut loaded = PDFDocument::open(&path).unwrap();
    assert_eq!(loaded.resolve(ids[0]).unwrap(), &PDFObject::name("OnDisk"));
}

#[test_log::test]
fn test_open_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        PDFDocument::open(dir.path().join("missing.pdf")),
        Err(PDFError::Io(_))
    ));
}
