use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use risc_debug_helper::context::{
    load_context, load_context_with, ContextKind, Device, DeviceDiscovery, ExecutionContext,
    GraphHandle, Netlist,
};
use risc_debug_helper::error::{CapabilityError, LoadError, SymbolError, TransportError};
use risc_debug_helper::firmware::{FirmwareImage, ImageParser, Member, TypeDef};
use risc_debug_helper::location::{CoreLocation, DeviceId};
use risc_debug_helper::SessionConfig;

struct FakeDiscovery {
    ids: Vec<DeviceId>,
    arch: &'static str,
    calls: AtomicUsize,
}

impl FakeDiscovery {
    fn new(ids: Vec<DeviceId>, arch: &'static str) -> Arc<Self> {
        Arc::new(Self {
            ids,
            arch,
            calls: AtomicUsize::new(0),
        })
    }
}

impl DeviceDiscovery for FakeDiscovery {
    fn device_ids(&self) -> Result<Vec<DeviceId>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ids.clone())
    }

    fn device_arch(&self, _device_id: DeviceId) -> Result<String, TransportError> {
        Ok(self.arch.to_string())
    }
}

struct BrokenDiscovery;

impl DeviceDiscovery for BrokenDiscovery {
    fn device_ids(&self) -> Result<Vec<DeviceId>, TransportError> {
        Err(TransportError::Other("no driver".to_string()))
    }

    fn device_arch(&self, device_id: DeviceId) -> Result<String, TransportError> {
        Err(TransportError::UnknownDevice(device_id))
    }
}

/// One graph owning the core at 0:1-1, running `matmul`.
struct FakeNetlist {
    lookups: AtomicUsize,
    ids: Vec<DeviceId>,
}

impl FakeNetlist {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            lookups: AtomicUsize::new(0),
            ids: vec![0, 1],
        })
    }

    /// A netlist that names the architecture but no devices.
    fn without_devices() -> Arc<Self> {
        Arc::new(Self {
            lookups: AtomicUsize::new(0),
            ids: Vec::new(),
        })
    }
}

fn worker() -> CoreLocation {
    CoreLocation::new(0, 1, 1)
}

impl Netlist for FakeNetlist {
    fn graph_owning(&self, location: &CoreLocation) -> Option<GraphHandle> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        (*location == worker()).then(|| GraphHandle("fwd_0".to_string()))
    }

    fn operation_name(&self, _graph: &GraphHandle, _location: &CoreLocation) -> Option<String> {
        Some("matmul".to_string())
    }

    fn firmware_path_for_operation(
        &self,
        graph: &GraphHandle,
        operation: &str,
        core_index: u8,
    ) -> Option<PathBuf> {
        Some(PathBuf::from(format!(
            "/run/graph_{}/{operation}/trisc{core_index}.elf",
            graph.0
        )))
    }

    fn device_ids(&self) -> Vec<DeviceId> {
        self.ids.clone()
    }

    fn arch(&self) -> Option<String> {
        Some("wormhole_b0".to_string())
    }
}

#[test]
fn unsupported_context_fails_closed() {
    let ctx = load_context(
        Some(FakeDiscovery::new(vec![0], "quasar") as Arc<dyn DeviceDiscovery>),
        None,
        SessionConfig::default(),
    );
    assert_eq!(ctx.kind(), ContextKind::Unsupported);
    assert_eq!(ctx.arch(), Ok("quasar"));

    let netlist = ctx.netlist().err().unwrap();
    assert!(netlist.is_unavailable());
    let image = ctx.firmware_image_for(&worker(), 0).unwrap_err();
    assert!(image.is_unavailable());
    assert!(ctx.epoch_symbol_address().unwrap_err().is_unavailable());
    assert!(ctx.ethernet_epoch_symbol_address().unwrap_err().is_unavailable());
    assert!(ctx.firmware().err().unwrap().is_unavailable());
    assert!(ctx
        .record_loaded(&worker(), 0, PathBuf::from("/fw/brisc.elf"))
        .unwrap_err()
        .is_unavailable());
}

#[test]
fn nothing_to_discover_is_unsupported() {
    let ctx = load_context(None, None, SessionConfig::default());
    assert_eq!(ctx.kind(), ContextKind::Unsupported);
    assert!(matches!(ctx.devices(), Err(CapabilityError::Discovery(_))));
}

#[test]
fn limited_context_tracks_loaded_images() {
    let ctx = load_context(
        Some(FakeDiscovery::new(vec![0, 3], "wormhole_b0") as Arc<dyn DeviceDiscovery>),
        None,
        SessionConfig::default(),
    );
    assert_eq!(ctx.kind(), ContextKind::Limited);
    assert_eq!(ctx.device_ids(), Ok(&BTreeSet::from([0, 3])));
    assert_eq!(
        ctx.devices().unwrap().get(&3),
        Some(&Device {
            id: 3,
            arch: "wormhole_b0".to_string()
        })
    );

    assert_eq!(
        ctx.netlist().err(),
        Some(CapabilityError::LimitedFunctionality("netlist"))
    );
    assert!(matches!(
        ctx.epoch_symbol_address(),
        Err(CapabilityError::LimitedFunctionality(_))
    ));

    assert_eq!(ctx.firmware_image_for(&worker(), 1), Ok(None));
    ctx.record_loaded(&worker(), 1, PathBuf::from("/fw/trisc1.elf"))
        .unwrap();
    assert_eq!(
        ctx.firmware_image_for(&worker(), 1),
        Ok(Some(PathBuf::from("/fw/trisc1.elf")))
    );
    // Registered per core.
    assert_eq!(ctx.firmware_image_for(&worker(), 2), Ok(None));
}

#[test]
fn device_discovery_runs_once() {
    let discovery = FakeDiscovery::new(vec![0], "grayskull");
    let ctx = load_context(
        Some(discovery.clone() as Arc<dyn DeviceDiscovery>),
        None,
        SessionConfig::default(),
    );
    for _ in 0..3 {
        ctx.device_ids().unwrap();
        ctx.devices().unwrap();
        ctx.arch().unwrap();
    }
    assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn full_context_falls_back_to_the_netlist() {
    let ctx = load_context(
        Some(Arc::new(BrokenDiscovery) as Arc<dyn DeviceDiscovery>),
        Some(FakeNetlist::new() as Arc<dyn Netlist>),
        SessionConfig::default(),
    );
    assert_eq!(ctx.kind(), ContextKind::Full);
    assert_eq!(ctx.device_ids(), Ok(&BTreeSet::from([0, 1])));
    assert_eq!(ctx.arch(), Ok("wormhole_b0"));
    let devices: BTreeMap<_, _> = ctx.devices().unwrap().clone();
    assert_eq!(devices.len(), 2);
    assert!(ctx.netlist().is_ok());
}

#[test]
fn full_context_derives_firmware_paths_once() {
    let netlist = FakeNetlist::new();
    let ctx = load_context(
        Some(FakeDiscovery::new(vec![0], "wormhole_b0") as Arc<dyn DeviceDiscovery>),
        Some(netlist.clone() as Arc<dyn Netlist>),
        SessionConfig::default(),
    );
    let expected = Some(PathBuf::from("/run/graph_fwd_0/matmul/trisc2.elf"));
    assert_eq!(ctx.firmware_image_for(&worker(), 2), Ok(expected.clone()));
    assert_eq!(ctx.firmware_image_for(&worker(), 2), Ok(expected));
    assert_eq!(netlist.lookups.load(Ordering::SeqCst), 1);

    assert_eq!(
        ctx.firmware_image_for(&CoreLocation::new(0, 9, 9), 0),
        Ok(None)
    );
    assert!(ctx
        .record_loaded(&worker(), 0, PathBuf::from("/fw/brisc.elf"))
        .is_err());
}

#[test]
fn full_context_without_images_reports_missing_symbols() {
    let ctx = load_context(
        Some(FakeDiscovery::new(vec![0], "grayskull") as Arc<dyn DeviceDiscovery>),
        Some(FakeNetlist::new() as Arc<dyn Netlist>),
        SessionConfig::default(),
    );
    let err = ctx.ethernet_epoch_symbol_address().unwrap_err();
    assert!(!err.is_unavailable());
    assert_eq!(
        err,
        CapabilityError::Symbol(SymbolError::UnknownImage("brisc".to_string()))
    );
}

#[test]
fn full_context_firmware_load_failure_is_cached() {
    let config = SessionConfig {
        firmware: BTreeMap::from([(
            "brisc".to_string(),
            PathBuf::from("/does/not/exist/brisc.elf"),
        )]),
        ..SessionConfig::default()
    };
    let ctx = load_context(
        Some(FakeDiscovery::new(vec![0], "wormhole_b0") as Arc<dyn DeviceDiscovery>),
        Some(FakeNetlist::new() as Arc<dyn Netlist>),
        config,
    );
    let first = ctx.epoch_symbol_address().unwrap_err();
    assert!(matches!(first, CapabilityError::FirmwareLoad(_)));
    assert_eq!(ctx.epoch_symbol_address().unwrap_err(), first);
}

#[test]
fn architecture_comes_from_the_netlist_when_no_device_answers() {
    let ctx = load_context(
        Some(Arc::new(BrokenDiscovery) as Arc<dyn DeviceDiscovery>),
        Some(FakeNetlist::without_devices() as Arc<dyn Netlist>),
        SessionConfig::default(),
    );
    assert_eq!(ctx.arch(), Ok("wormhole_b0"));
    assert_eq!(ctx.kind(), ContextKind::Full);
    assert!(matches!(ctx.device_ids(), Err(CapabilityError::Discovery(_))));
}

/// Serves a brisc image with the epoch constants, whatever path it is given.
struct EpochFirmware {
    with_ethernet: bool,
    parses: AtomicUsize,
}

impl ImageParser for EpochFirmware {
    fn parse(&self, prefix: &str, path: &Path) -> Result<FirmwareImage, LoadError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let mut image = FirmwareImage::new(prefix).with_path(path);
        let u32_t = image.add_type(TypeDef::base("uint32_t", 4));
        image.add_type(TypeDef::structure(
            "epoch_t",
            8,
            vec![Member::new("id", 0, u32_t), Member::new("valid", 4, u32_t)],
        ));
        image.add_constant("EPOCH_INFO_ADDR", 0x0002_0080, u32_t);
        if self.with_ethernet {
            image.add_constant("ETH_EPOCH_INFO_ADDR", 0x0000_9040, u32_t);
        }
        Ok(image)
    }
}

fn epoch_context(arch: &'static str, parser: Arc<EpochFirmware>) -> Box<dyn ExecutionContext> {
    let config = SessionConfig {
        firmware: BTreeMap::from([("brisc".to_string(), PathBuf::from("/fw/brisc.elf"))]),
        ..SessionConfig::default()
    };
    load_context_with(
        Some(FakeDiscovery::new(vec![0], arch) as Arc<dyn DeviceDiscovery>),
        Some(FakeNetlist::new() as Arc<dyn Netlist>),
        config,
        parser as Arc<dyn ImageParser>,
    )
}

#[test]
fn full_context_resolves_epoch_symbols() {
    let parser = Arc::new(EpochFirmware {
        with_ethernet: true,
        parses: AtomicUsize::new(0),
    });
    let ctx = epoch_context("wormhole_b0", parser.clone());
    assert_eq!(ctx.epoch_symbol_address(), Ok(0x0002_0080));
    assert_eq!(ctx.ethernet_epoch_symbol_address(), Ok(0x0000_9040));
    assert_eq!(
        ctx.firmware().unwrap().image("brisc").and_then(|image| image.path()),
        Some(Path::new("/fw/brisc.elf"))
    );
    assert_eq!(parser.parses.load(Ordering::SeqCst), 1);
}

#[test]
fn ethernet_epoch_symbol_is_missing_without_ethernet_cores() {
    let parser = Arc::new(EpochFirmware {
        with_ethernet: false,
        parses: AtomicUsize::new(0),
    });
    let ctx = epoch_context("grayskull", parser);
    assert_eq!(ctx.epoch_symbol_address(), Ok(0x0002_0080));
    let err = ctx.ethernet_epoch_symbol_address().unwrap_err();
    assert!(!err.is_unavailable());
    assert_eq!(
        err,
        CapabilityError::Symbol(SymbolError::NotFound("brisc.ETH_EPOCH_INFO_PTR".to_string()))
    );
}
