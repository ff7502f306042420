use std::fs;
use std::os::unix::fs::symlink;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rdma_cdi::cdi::{spec_file_name, Spec, SpecFormat};
use rdma_cdi::device::{verify_rdma_devices, RdmaDevice};
use rdma_cdi::{DeviceDiscoverer, HostPaths, SysfsDiscoverer};
use tempfile::TempDir;

/// Fake host with `functions` RDMA-capable PCI functions
fn fake_host(functions: usize) -> (TempDir, HostPaths) {
    let root = TempDir::new().unwrap();
    let paths = HostPaths::with_root(root.path());
    fs::create_dir_all(&paths.dev_infiniband).unwrap();
    fs::write(paths.dev_infiniband.join("rdma_cm"), "").unwrap();

    for i in 0..functions {
        let pci = paths.pci_devices.join(format!("0000:{:02x}:00.0", i + 1));
        let ibdev = format!("mlx5_{i}");
        let ifname = format!("ib{i}");
        fs::create_dir_all(pci.join("infiniband").join(&ibdev)).unwrap();
        fs::create_dir_all(pci.join("net").join(&ifname)).unwrap();

        for (class, entry) in [
            ("infiniband_mad", format!("umad{i}")),
            ("infiniband_verbs", format!("uverbs{i}")),
        ] {
            let dir = paths.sys_class.join(class).join(entry);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("ibdev"), &ibdev).unwrap();
        }

        let net = paths.net_devices.join(&ifname);
        fs::create_dir_all(&net).unwrap();
        symlink(&pci, net.join("device")).unwrap();
        fs::write(net.join("operstate"), "up").unwrap();
        fs::write(net.join("mtu"), "4092").unwrap();
        fs::write(net.join("type"), "32").unwrap();
    }
    (root, paths)
}

pub fn bench_discover_all(c: &mut Criterion) {
    let (_root, paths) = fake_host(16);
    let discoverer = SysfsDiscoverer::with_paths(paths);
    c.bench_function("discover_all_16", |b| {
        b.iter(|| discoverer.discover_all().unwrap())
    });
}

pub fn bench_verify(c: &mut Criterion) {
    let devices = [
        "/dev/infiniband/issm0",
        "/dev/infiniband/umad0",
        "/dev/infiniband/uverbs0",
        "/dev/infiniband/rdma_cm",
    ];
    c.bench_function("verify_rdma_devices", |b| {
        b.iter(|| verify_rdma_devices(black_box(&devices)))
    });
}

pub fn bench_spec(c: &mut Criterion) {
    let dev = RdmaDevice::new(
        "0000:17:00.0",
        vec![
            "/dev/infiniband/umad0".to_string(),
            "/dev/infiniband/uverbs0".to_string(),
            "/dev/infiniband/rdma_cm".to_string(),
        ],
    );
    let spec = Spec::build("example.io/rdma", "ib0", &[dev]);
    c.bench_function("spec_file_name", |b| {
        b.iter(|| spec_file_name(black_box("example.io/rdma"), black_box("ib0"), "yaml"))
    });
    c.bench_function("marshal_yaml", |b| {
        b.iter(|| spec.marshal(SpecFormat::Yaml).unwrap())
    });
}

criterion_group!(benches, bench_discover_all, bench_verify, bench_spec);
criterion_main!(benches);
