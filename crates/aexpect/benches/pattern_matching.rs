//! Pattern matching benchmarks.
#![allow(missing_docs)]

use std::hint::black_box;

use aexpect::{last_line, last_word, match_patterns, remove_last_nonempty_line};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

const PROMPT: &str = r"[\#\$]\s*$";

fn shell_output(lines: usize) -> String {
    let mut out = String::with_capacity(lines * 48);
    for i in 0..lines {
        out.push_str(&format!("drwxr-xr-x 2 root root 4096 Jan  1 00:00 dir{i}\n"));
    }
    out.push_str("root@host:~# ");
    out
}

fn bench_prompt_on_last_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("prompt_last_line");

    for lines in &[10, 1_000, 100_000] {
        let output = shell_output(*lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &output, |b, output| {
            b.iter(|| match_patterns(last_line(black_box(output)), &[PROMPT]));
        });
    }

    group.finish();
}

fn bench_whole_output(c: &mut Criterion) {
    let mut group = c.benchmark_group("whole_output");

    for lines in &[10, 1_000, 100_000] {
        let output = shell_output(*lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &output, |b, output| {
            b.iter(|| match_patterns(black_box(output), &["Permission denied", PROMPT]));
        });
    }

    group.finish();
}

fn bench_pattern_list_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_list_size");
    let output = shell_output(100);

    for size in &[2, 5, 10, 20] {
        let mut patterns: Vec<String> = (0..*size).map(|i| format!("pattern{i}")).collect();
        patterns.push(PROMPT.to_string());

        group.bench_with_input(BenchmarkId::from_parameter(size), &patterns, |b, patterns| {
            b.iter(|| match_patterns(last_word(black_box(&output)), patterns));
        });
    }

    group.finish();
}

fn bench_prompt_stripping(c: &mut Criterion) {
    let output = shell_output(1_000);

    c.bench_function("remove_last_nonempty_line", |b| {
        b.iter(|| remove_last_nonempty_line(black_box(&output)));
    });
}

criterion_group!(
    benches,
    bench_prompt_on_last_line,
    bench_whole_output,
    bench_pattern_list_sizes,
    bench_prompt_stripping,
);
criterion_main!(benches);
