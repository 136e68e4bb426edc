use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;

use vmf_merge::diff::diff;
use vmf_merge::merge::merge_delta_lists;
use vmf_merge::VmfMap;

/// Builds a synthetic map with `solids` one-sided brushes. Every
/// `retexture_every`-th brush (when nonzero) gets a different material, which
/// is what the diff benchmarks mutate.
fn synthetic_vmf(mapversion: i32, solids: usize, retexture_every: usize) -> String {
    let mut world_body = String::new();
    for index in 0..solids {
        let material = if retexture_every != 0 && index % retexture_every == 0 {
            "BRICK/BRICKFLOOR001A"
        } else {
            "DEV/DEV_MEASUREGENERIC01B"
        };
        world_body.push_str(&format!(
            "\tsolid\n\t{{\n\
             \t\t\"id\" \"{id}\"\n\
             \t\tside\n\t\t{{\n\
             \t\t\t\"id\" \"{id}\"\n\
             \t\t\t\"plane\" \"(0 0 0) (64 0 0) (64 64 0)\"\n\
             \t\t\t\"material\" \"{material}\"\n\
             \t\t}}\n\
             \t\teditor\n\t\t{{\n\
             \t\t\t\"color\" \"0 180 0\"\n\
             \t\t}}\n\
             \t}}\n",
            id = 10 + index,
        ));
    }
    format!(
        "versioninfo\n{{\n\t\"mapversion\" \"{mapversion}\"\n}}\n\
         visgroups\n{{\n}}\n\
         world\n{{\n\
         \t\"id\" \"1\"\n\
         \t\"classname\" \"worldspawn\"\n\
         {world_body}\
         }}\n"
    )
}

fn benchmark_merge_pipeline(c: &mut Criterion) {
    let parent_content = synthetic_vmf(1, 500, 0);
    let child_a_content = synthetic_vmf(2, 500, 7);
    let child_b_content = synthetic_vmf(2, 500, 13);

    let parent = VmfMap::parse(&parent_content).unwrap();
    let child_a = VmfMap::parse(&child_a_content).unwrap();
    let child_b = VmfMap::parse(&child_b_content).unwrap();

    let mut group = c.benchmark_group("vmf merge");
    group.sample_size(50);
    group.measurement_time(Duration::from_secs(8));

    group.bench_function("parse 500 solids", |b| {
        b.iter(|| VmfMap::parse(black_box(&parent_content)).unwrap())
    });

    group.bench_function("diff 500 solids", |b| {
        // The differ mutates the parent's ID counters, so each iteration
        // works on a fresh copy.
        b.iter_batched(
            || parent.clone(),
            |mut parent| diff(&mut parent, black_box(&child_a)),
            BatchSize::SmallInput,
        )
    });

    group.bench_function("merge two delta lists", |b| {
        let mut scratch = parent.clone();
        let deltas_a = diff(&mut scratch, &child_a);
        let deltas_b = diff(&mut scratch, &child_b);
        b.iter_batched(
            || vec![deltas_a.clone(), deltas_b.clone()],
            |lists| merge_delta_lists(lists, false),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, benchmark_merge_pipeline);
criterion_main!(benches);
