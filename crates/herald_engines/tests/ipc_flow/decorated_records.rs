#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use herald_engines::owner_id::{OwnerIdResolver, OwnerIdResolverConfig, PackageUidTable};
use herald_engines::source::SourceRecord;
use herald_engines::transport::LoopbackLink;
use herald_engines::wire::{read_record_array, write_record_array};
use herald_engines::{
    decode_record, encode_record, CommunicationError, DecoratedRecord, Parcel, PayloadFreshness,
    WireConfig, WireError, WriteFlags,
};
use herald_kernel_contracts::payload::{
    ExtraValue, Extras, NotificationPayload, FLAG_NO_CLEAR, FLAG_ONGOING_EVENT,
};
use herald_kernel_contracts::record::{PostTimeMs, UserHandle};
use serde::{Deserialize, Serialize};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Progress {
    current: u32,
    max: u32,
}

struct PlatformRecord {
    package: &'static str,
    id: i32,
    tag: Option<&'static str>,
    owner_field: Option<i64>,
    payload: NotificationPayload,
}

impl SourceRecord for PlatformRecord {
    fn package(&self) -> &str {
        self.package
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn tag(&self) -> Option<&str> {
        self.tag
    }

    fn user(&self) -> UserHandle {
        UserHandle(10)
    }

    fn post_time(&self) -> PostTimeMs {
        PostTimeMs(1_700_000_000_000)
    }

    fn payload(&self) -> NotificationPayload {
        self.payload.clone()
    }

    fn platform_field(&self, name: &str) -> Option<i64> {
        if name == "uid" {
            self.owner_field
        } else {
            None
        }
    }
}

fn upload_payload() -> NotificationPayload {
    let mut extras = Extras::new();
    extras.put("channel", ExtraValue::Text("uploads".to_string()));
    extras
        .put_structured("progress", &Progress { current: 3, max: 10 })
        .unwrap();
    NotificationPayload {
        flags: FLAG_ONGOING_EVENT,
        title: Some("Uploading".to_string()),
        extras,
        ..NotificationPayload::default()
    }
}

fn platform_record(owner_field: Option<i64>) -> PlatformRecord {
    PlatformRecord {
        package: "com.example.sync",
        id: 5,
        tag: Some("upload"),
        owner_field,
        payload: upload_payload(),
    }
}

fn resolver() -> OwnerIdResolver {
    let mut uids = BTreeMap::new();
    uids.insert("com.example.sync".to_string(), 10_077);
    OwnerIdResolver::from_config(&OwnerIdResolverConfig::mvp_v1(), PackageUidTable::new(uids))
}

/// Encodes on one side, delivers over `link`, decodes on the other.
fn send(record: &mut DecoratedRecord, link: &LoopbackLink, flags: WriteFlags) -> DecoratedRecord {
    let mut out = Parcel::new(WireConfig::mvp_v1());
    encode_record(record, &mut out, flags).unwrap();
    let mut delivered = out.transfer(link);
    let decoded = decode_record(&mut delivered).unwrap();
    assert_eq!(delivered.remaining(), 0);
    decoded
}

#[test]
fn at_ipc_flow_01_wrapped_record_crosses_the_boundary_decorated() {
    init_tracing();
    let source = platform_record(Some(10_050));
    let mut record = DecoratedRecord::wrap(&source, &resolver())
        .unwrap()
        .with_tag(None)
        .with_id(42);
    assert_eq!(record.owner_id(), 10_050);

    let link = LoopbackLink::new();
    let received = send(&mut record, &link, WriteFlags::NONE);

    assert_eq!(received.package(), "com.example.sync");
    assert_eq!(received.effective_id(), 42);
    assert_eq!(received.effective_tag(), None);
    assert_eq!(received.owner_id(), 10_050);
    assert_eq!(received.user(), UserHandle(10));
    assert_eq!(received.effective_key(), "10|com.example.sync|42|null|10050");
    assert_eq!(received.freshness(), PayloadFreshness::RemoteUnfetched);
    assert_eq!(link.stats().fetch_calls(), 0);
}

#[test]
fn at_ipc_flow_02_owner_falls_back_to_package_table_then_zero() {
    init_tracing();
    let from_table = DecoratedRecord::wrap(&platform_record(None), &resolver()).unwrap();
    assert_eq!(from_table.owner_id(), 10_077);

    let bare = OwnerIdResolver::from_config(
        &OwnerIdResolverConfig::parse_list("accessor,field").unwrap(),
        PackageUidTable::default(),
    );
    let unresolved = DecoratedRecord::wrap(&platform_record(None), &bare).unwrap();
    assert_eq!(unresolved.owner_id(), 0);
}

#[test]
fn at_ipc_flow_03_predicates_never_transfer_the_whole_payload() {
    init_tracing();
    let mut record = DecoratedRecord::wrap(&platform_record(Some(1)), &resolver()).unwrap();
    let link = LoopbackLink::new();
    let received = send(&mut record, &link, WriteFlags::NONE);

    assert!(received.is_ongoing().unwrap());
    assert!(!received.is_clearable().unwrap());
    assert_eq!(
        received.payload_handle().extra("channel").unwrap(),
        Some(ExtraValue::Text("uploads".to_string()))
    );
    assert_eq!(link.stats().fetch_calls(), 0);
    assert_eq!(link.stats().flags_calls(), 2);
    assert!(!received.is_dirty());
}

#[test]
fn at_ipc_flow_04_narrow_writes_reach_the_owner() {
    init_tracing();
    let mut record = DecoratedRecord::wrap(&platform_record(Some(1)), &resolver()).unwrap();
    let link = LoopbackLink::new();
    let received = send(&mut record, &link, WriteFlags::NONE);

    received.payload_handle().set_flags(FLAG_NO_CLEAR).unwrap();
    assert!(!record.is_ongoing().unwrap());
    assert!(!record.is_clearable().unwrap());
    assert_eq!(record.whole_payload().unwrap().flags, FLAG_NO_CLEAR);
}

#[test]
fn at_ipc_flow_05_fetched_extras_are_rebound_for_typed_reads() {
    init_tracing();
    let mut record = DecoratedRecord::wrap(&platform_record(Some(1)), &resolver()).unwrap();
    let link = LoopbackLink::new();
    let mut received = send(&mut record, &link, WriteFlags::NONE);

    let view = received.whole_payload().unwrap();
    assert!(view.extras.is_bound());
    assert_eq!(
        view.extras.structured::<Progress>("progress").unwrap(),
        Some(Progress { current: 3, max: 10 })
    );
    drop(view);
    assert_eq!(received.freshness(), PayloadFreshness::RemoteCachedDirty);
    assert_eq!(link.stats().fetch_calls(), 1);
}

#[test]
fn at_ipc_flow_06_dirty_record_forwards_its_cache_not_the_origin() {
    init_tracing();
    let mut record = DecoratedRecord::wrap(&platform_record(Some(1)), &resolver()).unwrap();
    let first_hop = LoopbackLink::new();
    let mut middle = send(&mut record, &first_hop, WriteFlags::NONE);

    middle.whole_payload().unwrap().title = Some("Edited in the middle".to_string());
    record.whole_payload().unwrap().title = Some("Edited at the origin".to_string());

    let second_hop = LoopbackLink::new();
    let mut last = send(&mut middle, &second_hop, WriteFlags::NONE);
    assert_eq!(
        last.whole_payload().unwrap().title.as_deref(),
        Some("Edited in the middle")
    );
    assert_eq!(first_hop.stats().fetch_calls(), 1);
    assert_eq!(second_hop.stats().fetch_calls(), 1);
}

#[test]
fn at_ipc_flow_07_plain_escape_bakes_identity_for_unaware_readers() {
    init_tracing();
    let mut record = DecoratedRecord::wrap(&platform_record(Some(1)), &resolver())
        .unwrap()
        .with_tag(Some("retagged"))
        .with_id(77);
    let link = LoopbackLink::new();
    let mut received = send(&mut record, &link, WriteFlags::AS_ORIGINAL);

    assert_eq!(received.freshness(), PayloadFreshness::Local);
    assert!(!received.is_decorated());
    assert_eq!(received.base().id, 77);
    assert_eq!(received.base().tag.as_deref(), Some("retagged"));
    assert_eq!(
        received.whole_payload().unwrap().title.as_deref(),
        Some("Uploading")
    );
    assert_eq!(link.stats().fetch_calls(), 0);
}

#[test]
fn at_ipc_flow_08_severed_peer_surfaces_as_communication_error() {
    init_tracing();
    let mut record = DecoratedRecord::wrap(&platform_record(Some(1)), &resolver()).unwrap();
    let link = LoopbackLink::new();
    let mut received = send(&mut record, &link, WriteFlags::NONE);
    link.sever();

    assert_eq!(received.is_ongoing(), Err(CommunicationError::PeerGone));
    assert!(matches!(
        received.whole_payload(),
        Err(CommunicationError::PeerGone)
    ));
    assert_eq!(received.freshness(), PayloadFreshness::RemoteUnfetched);

    let mut out = Parcel::new(WireConfig::mvp_v1());
    assert_eq!(
        encode_record(&mut received, &mut out, WriteFlags::AS_ORIGINAL),
        Err(WireError::Communication(CommunicationError::PeerGone))
    );
}

#[test]
fn at_ipc_flow_09_record_arrays_mix_native_and_plain_elements() {
    init_tracing();
    let resolver = resolver();
    let mut native = vec![DecoratedRecord::wrap(&platform_record(Some(1)), &resolver)
        .unwrap()
        .with_id(1)];
    let mut plain = vec![DecoratedRecord::wrap(&platform_record(Some(2)), &resolver)
        .unwrap()
        .with_id(2)];

    let mut out = Parcel::new(WireConfig::mvp_v1());
    out.write_i32(2);
    for record in native.iter_mut() {
        encode_record(record, &mut out, WriteFlags::NONE).unwrap();
    }
    for record in plain.iter_mut() {
        encode_record(record, &mut out, WriteFlags::AS_ORIGINAL).unwrap();
    }
    let mut delivered = out.transfer(&LoopbackLink::new());
    let records = read_record_array(&mut delivered).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].freshness(), PayloadFreshness::RemoteUnfetched);
    assert_eq!(records[0].effective_id(), 1);
    assert_eq!(records[1].freshness(), PayloadFreshness::Local);
    assert_eq!(records[1].owner_id(), 2);

    let mut again = Parcel::new(WireConfig::mvp_v1());
    write_record_array(&mut native, &mut again, WriteFlags::NONE).unwrap();
    assert_eq!(read_record_array(&mut again).unwrap().len(), 1);
}
