use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use lectern_index::course::{ChunkerConfig, CourseChunker, parse_course};
use std::hint::black_box;

fn generate_body(size: usize) -> String {
    let paragraph = "Retrieval augmented generation grounds answers in source text. \
                     Dr. Smith explains embeddings in lesson two! Does chunk overlap help recall? \
                     It usually does.\n";
    let text = paragraph.repeat(size / paragraph.len() + 1);
    text[..text.floor_char_boundary(size)].to_string()
}

fn generate_course(lessons: usize, body_size: usize) -> String {
    let mut doc = String::from(
        "Course Title: Benchmarking Retrieval\nCourse Link: https://example.com/bench\n\n",
    );
    for n in 1..=lessons {
        doc.push_str(&format!("Lesson {n}: Part {n}\n{}\n", generate_body(body_size)));
    }
    doc
}

fn split_body(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_body");
    let chunker = CourseChunker::new(ChunkerConfig::default());

    for size in [1_000, 10_000, 100_000] {
        let input = generate_body(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("default", size), &input, |b, input| {
            b.iter(|| chunker.split_body(black_box(input)));
        });
    }

    group.finish();
}

fn chunk_course(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_course");
    let chunker = CourseChunker::new(ChunkerConfig::default());

    for lessons in [5, 20] {
        let text = generate_course(lessons, 5_000);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse_and_chunk", lessons), &text, |b, text| {
            b.iter(|| {
                let doc = parse_course(black_box(text)).unwrap();
                chunker.chunk(&doc)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, split_body, chunk_course);
criterion_main!(benches);
