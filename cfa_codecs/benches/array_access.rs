use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use cfa_codecs::{Array2d, Array3f};

const NX: usize = 256;
const NY: usize = 256;

fn field(len: usize) -> Vec<f64> {
    (0..len).map(|i| ((i % 251) as f64 * 0.05).sin()).collect()
}

fn bench_bulk(c: &mut Criterion) {
    let values = field(NX * NY);
    let mut group = c.benchmark_group("bulk");
    group.throughput(Throughput::Bytes((NX * NY * 8) as u64));

    for rate in [8.0, 16.0, 32.0] {
        let mut array = Array2d::new(NX, NY, rate, None, 0).unwrap();
        group.bench_function(format!("set_all/rate{rate}"), |b| {
            b.iter(|| array.set_all(black_box(&values)).unwrap())
        });

        let mut out = vec![0.0; NX * NY];
        group.bench_function(format!("get_all/rate{rate}"), |b| {
            b.iter(|| array.get_all(black_box(&mut out)).unwrap())
        });
    }
    group.finish();
}

fn bench_elements(c: &mut Criterion) {
    let values = field(NX * NY);
    let mut group = c.benchmark_group("elements");
    group.throughput(Throughput::Elements((NX * NY) as u64));

    let array = Array2d::new(NX, NY, 16.0, Some(&values), 0).unwrap();
    group.bench_function("get/raster", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for j in 0..NY {
                for i in 0..NX {
                    sum += array.get(i, j);
                }
            }
            black_box(sum)
        })
    });

    let mut array = Array2d::new(NX, NY, 16.0, None, 0).unwrap();
    group.bench_function("set/raster", |b| {
        b.iter(|| {
            for j in 0..NY {
                for i in 0..NX {
                    array.set(i, j, (i + j) as f64);
                }
            }
        })
    });

    let mut volume = Array3f::new(64, 64, 64, 8.0, None, 0).unwrap();
    group.bench_function("add/volume", |b| {
        b.iter(|| {
            for k in 0..64 {
                for j in 0..64 {
                    for i in 0..64 {
                        volume.add(i, j, k, 1.0);
                    }
                }
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_bulk, bench_elements);
criterion_main!(benches);
