//! Benchmarks for the tokenizer, the xref arena and whole-document saves

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use pdf_kernel::pdf::{TokenKind, Tokenizer};
use pdf_kernel::{Dictionary, Name, PDFDocument, PDFObject, WriterProperties, XRefTable};

/// Body of `count` small dictionary objects
fn generate_body(count: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 1..=count {
        data.extend_from_slice(
            format!(
                "{} 0 obj\n<< /Type /Annot /Rect [0 0 {}.5 72] /Parent {} 0 R /T (item {}) >>\nendobj\n",
                i,
                i,
                i + 1,
                i
            )
            .as_bytes(),
        );
    }
    data
}

fn build_document(count: usize) -> PDFDocument {
    let mut doc = PDFDocument::new();
    let mut kids = Vec::with_capacity(count);
    for i in 0..count {
        let mut dict = Dictionary::new();
        dict.set("Type", Name::from("Page"));
        dict.set("Index", i);
        kids.push(PDFObject::from(doc.create_reference(dict)));
    }
    let mut catalog = Dictionary::new();
    catalog.set("Kids", kids);
    let root = doc.create_reference(catalog);
    doc.register_trailer_root(root);
    doc
}

fn bench_tokenizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenizer");
    for count in [100, 10_000] {
        let data = generate_body(count);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| {
                let mut tokenizer = Tokenizer::new(black_box(data));
                let mut tokens = 0usize;
                while let Ok(token) = tokenizer.next_meaningful_token() {
                    if token.kind == TokenKind::EndOfFile {
                        break;
                    }
                    tokens += 1;
                }
                tokens
            });
        });
    }
    group.finish();
}

fn bench_xref_churn(c: &mut Criterion) {
    c.bench_function("xref_create_free_reuse", |b| {
        b.iter(|| {
            let mut xref = XRefTable::new();
            let ids: Vec<_> = (0..1000).map(|i| xref.create_reference(PDFObject::from(i as i64))).collect();
            for id in ids.iter().step_by(2) {
                xref.free(id.number);
            }
            for i in 0..500 {
                black_box(xref.create_reference(PDFObject::from(i as i64)));
            }
            xref.size()
        });
    });
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");
    for full_compression in [false, true] {
        group.bench_with_input(
            BenchmarkId::new("full_compression", full_compression),
            &full_compression,
            |b, &full_compression| {
                b.iter_batched(
                    || build_document(2_000),
                    |mut doc| {
                        let props = WriterProperties::new().with_full_compression(full_compression);
                        doc.save(Vec::new(), props).map(|bytes| bytes.len())
                    },
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_tokenizer, bench_xref_churn, bench_save);
criterion_main!(benches);
