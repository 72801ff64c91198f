use accelerator_connector::{
    AcceleratorConnector, EnvSnapshot, GpuRequest, HostCapabilities, Platform, ResolutionInput,
};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn benchmark_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    let cpu = Platform::new(HostCapabilities::cpu_only(), EnvSnapshot::default());
    group.bench_function("cpu_default", |b| {
        b.iter(|| {
            black_box(AcceleratorConnector::new(ResolutionInput::new(), cpu.clone()).unwrap());
        })
    });

    // Multi-GPU without a backend falls back to spawn with a warning
    let gpus = Platform::new(HostCapabilities::with_gpus(8), EnvSnapshot::default());
    group.bench_function("multi_gpu_autodetect", |b| {
        b.iter(|| {
            let input = ResolutionInput::new().with_gpus(GpuRequest::Count(8));
            black_box(AcceleratorConnector::new(input, gpus.clone()).unwrap());
        })
    });

    let slurm_env = EnvSnapshot::from_pairs([
        ("SLURM_NTASKS", "16"),
        ("SLURM_JOB_NAME", "train"),
        ("SLURM_JOB_ID", "4242"),
        ("SLURM_NODELIST", "node[1-2]"),
    ]);
    let slurm = Platform::new(HostCapabilities::with_gpus(8), slurm_env);
    group.bench_function("slurm_ddp_16bit", |b| {
        b.iter(|| {
            let input = ResolutionInput::new()
                .with_backend("ddp")
                .with_gpus(GpuRequest::Count(8))
                .with_num_nodes(2)
                .with_precision(16);
            black_box(AcceleratorConnector::new(input, slurm.clone()).unwrap());
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_resolution);
criterion_main!(benches);
