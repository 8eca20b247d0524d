use car::{compress, extract, Options};
use criterion::{criterion_group, criterion_main, Criterion};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn build_tree(root: &Path) {
    for d in 0..8 {
        let dir = root.join(format!("dir_{d}"));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..32 {
            let size = 1000 + (d * 32 + f) * 4099;
            let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            fs::write(dir.join(format!("file_{f}.bin")), data).unwrap();
        }
    }
}

fn bench_roundtrip(c: &mut Criterion) {
    let src_dir = tempdir().unwrap();
    build_tree(src_dir.path());

    let mut group = c.benchmark_group("roundtrip");
    group.sample_size(10);

    for (label, options) in [("reflink", Options::default()), ("copy", Options::copy_only())] {
        group.bench_function(format!("compress_{label}"), |b| {
            let work = tempdir().unwrap();
            let archive = work.path().join("bench.car");
            b.iter(|| compress(src_dir.path(), &archive, &options).unwrap());
        });

        group.bench_function(format!("extract_{label}"), |b| {
            let work = tempdir().unwrap();
            let archive = work.path().join("bench.car");
            compress(src_dir.path(), &archive, &options).unwrap();
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                extract(&archive, &work.path().join(format!("out_{n}")), &options).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_roundtrip);
criterion_main!(benches);
