//! End-to-end tests: a JSON schema bound over an in-memory MSVC heap.

use memstruct::{
    parse_schema_str, BufferMemory, Item, MemStructError, MsvcProvider, Overlay, RawMemory, Value,
    View,
};
use std::sync::Arc;

const WORLD: u32 = 0x10000;

const SCHEMA: &str = r#"{
    "types": {
        "world": {
            "fields": [
                { "name": "name", "offset": 0, "type": { "kind": "stl_string" } },
                { "name": "tag", "offset": 24, "type": { "kind": "static_string", "length": 8 } },
                { "name": "flags", "offset": 32, "type": { "kind": "df_flagarray" } },
                { "name": "items", "offset": 40, "type": { "kind": "df_array", "stride": 4,
                    "element": { "kind": "number", "bits": 32, "signed": true } } },
                { "name": "queue", "offset": 48, "type": { "kind": "stl_deque", "stride": 4,
                    "element": { "kind": "number", "bits": 32, "signed": true } } },
                { "name": "units", "offset": 68, "type": { "kind": "df_linked_list",
                    "element": { "kind": "global", "name": "unit" } } },
                { "name": "seen", "offset": 80, "type": { "kind": "stl_bit_vector" } },
                { "name": "small", "offset": 96, "type": { "kind": "stl_vector", "stride": 2,
                    "element": { "kind": "number", "bits": 16, "signed": true } } },
                { "name": "temp", "offset": 108, "type": { "kind": "float" } },
                { "name": "big", "offset": 112, "type": { "kind": "number", "bits": 64, "signed": true } },
                { "name": "mode", "offset": 120, "type": { "kind": "bits", "shift": 4, "len": 3 } },
                { "name": "paused", "offset": 120, "type": { "kind": "bits", "shift": 0 } },
                { "name": "building", "offset": 124, "type": { "kind": "pointer",
                    "target": { "kind": "global", "name": "building" } } }
            ]
        },
        "unit": {
            "fields": [
                { "name": "id", "offset": 4, "type": { "kind": "number", "bits": 32, "signed": true } }
            ]
        },
        "building": {
            "rtti": "building",
            "fields": [
                { "name": "id", "offset": 4, "type": { "kind": "number", "bits": 32, "signed": true } }
            ]
        },
        "building_workshop": {
            "rtti": "building_workshopst",
            "fields": [
                { "name": "id", "offset": 4, "type": { "kind": "number", "bits": 32, "signed": true } },
                { "name": "kind", "offset": 8, "type": { "kind": "number", "bits": 16 } }
            ]
        }
    },
    "globals": { "world": { "address": 65536, "type": "world" } }
}"#;

struct Fixture {
    overlay: Overlay,
    provider: Arc<MsvcProvider<BufferMemory>>,
}

impl Fixture {
    fn new() -> Self {
        let schema = parse_schema_str(SCHEMA).unwrap();
        let provider = Arc::new(MsvcProvider::new(BufferMemory::new(WORLD, 0x10000)));
        let overlay = Overlay::new(Arc::new(schema), provider.clone());
        Fixture { overlay, provider }
    }

    fn w32(&self, addr: u32, value: u32) {
        self.provider.memory().write(addr, &value.to_le_bytes()).unwrap();
    }

    fn r32(&self, addr: u32) -> u32 {
        let b = self.provider.memory().read(addr, 4).unwrap();
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn world(&self) -> View<'_> {
        self.overlay.symbol("world").unwrap()
    }
}

fn value(item: Item<'_>) -> Value {
    item.into_value().expect("scalar item")
}

fn ints(view: &View<'_>) -> Vec<i64> {
    view.iter()
        .unwrap()
        .map(|item| match value(item.unwrap()) {
            Value::Int(v) => v,
            other => panic!("expected Int, got {:?}", other),
        })
        .collect()
}

#[test]
fn strings() {
    let f = Fixture::new();
    f.provider.memory().write(WORLD, b"hello").unwrap();
    f.w32(WORLD + 16, 5);
    f.w32(WORLD + 20, 15);

    let world = f.world();
    assert_eq!(value(world.field("name").unwrap()), Value::from("hello"));
    world.set_field("name", &Value::from("urist")).unwrap();
    assert_eq!(value(world.field("name").unwrap()), Value::from("urist"));
    assert!(matches!(
        world.set_field("name", &Value::from("a name far too long for the buffer")),
        Err(MemStructError::Access { .. })
    ));

    world.set_field("tag", &Value::from("abc")).unwrap();
    assert_eq!(
        value(world.field("tag").unwrap()),
        Value::Bytes(b"abc\0\0\0\0\0".to_vec())
    );
    world.set_field("tag", &Value::from("overlong tag")).unwrap();
    assert_eq!(value(world.field("tag").unwrap()), Value::from("overlong"));
    assert!(matches!(
        world.set_field("tag", &Value::Int(3)),
        Err(MemStructError::ValueMismatch { .. })
    ));
}

#[test]
fn flagarray() {
    let f = Fixture::new();
    f.w32(WORLD + 32, 0x11000);
    f.w32(WORLD + 36, 2);

    let flags = f.world().field_view("flags").unwrap();
    assert_eq!(flags.len().unwrap(), 16);
    flags.set_index(9, &Value::Bool(true)).unwrap();
    assert_eq!(f.r32(0x11000), 0x0200);
    assert_eq!(value(flags.index(-7).unwrap().unwrap()), Value::Bool(true));
    assert_eq!(value(flags.index(8).unwrap().unwrap()), Value::Bool(false));
    flags.set_index(9, &Value::Int(0)).unwrap();
    assert_eq!(f.r32(0x11000), 0);
    assert!(matches!(
        flags.set_index(16, &Value::Bool(true)),
        Err(MemStructError::InvalidIndex { index: 16, length: 16 })
    ));
}

#[test]
fn df_array() {
    let f = Fixture::new();
    f.w32(WORLD + 40, 3);
    f.w32(WORLD + 44, 0x11100);
    for (i, v) in [5u32, 6, 7].iter().enumerate() {
        f.w32(0x11100 + i as u32 * 4, *v);
    }

    let items = f.world().field_view("items").unwrap();
    assert_eq!(ints(&items), vec![5, 6, 7]);
    assert_eq!(value(items.field("length").unwrap()), Value::UInt(3));
    assert_eq!(value(items.field("ptr").unwrap()), Value::UInt(0x11100));
    items.set_index(-1, &Value::Int(-7)).unwrap();
    assert_eq!(f.r32(0x11108) as i32, -7);
    assert!(matches!(
        items.set_index(3, &Value::Int(0)),
        Err(MemStructError::InvalidIndex { .. })
    ));
    assert!(items.push(&Value::Int(0)).is_err());
}

#[test]
fn deque_spans_blocks() {
    let f = Fixture::new();
    let queue_addr = WORLD + 48;
    f.w32(queue_addr + 4, 0x11200);
    f.w32(queue_addr + 8, 2);
    f.w32(queue_addr + 12, 2);
    f.w32(queue_addr + 16, 4);
    f.w32(0x11200, 0x11300);
    f.w32(0x11204, 0x11400);
    f.w32(0x11308, 1);
    f.w32(0x1130c, 2);
    f.w32(0x11400, 3);
    f.w32(0x11404, 4);

    let queue = f.world().field_view("queue").unwrap();
    assert_eq!(queue.len().unwrap(), 4);
    assert_eq!(ints(&queue), vec![1, 2, 3, 4]);
    queue.set_index(-2, &Value::Int(30)).unwrap();
    assert_eq!(f.r32(0x11400), 30);
    assert!(queue.index(4).unwrap().is_none());
}

#[test]
fn linked_list_of_globals() {
    let f = Fixture::new();
    let head = WORLD + 68;
    f.w32(head + 8, 0x11500);
    f.w32(0x11500, 0x11600);
    f.w32(0x11508, 0x11510);
    f.w32(0x11510, 0x11700);
    f.w32(0x11604, 11);
    f.w32(0x11704, 12);

    let units = f.world().field_view("units").unwrap();
    let ids: Vec<Value> = units
        .iter()
        .unwrap()
        .map(|item| {
            let unit = item.unwrap().into_view().unwrap();
            assert_eq!(unit.compound().unwrap().type_name(), "unit");
            value(unit.field("id").unwrap())
        })
        .collect();
    assert_eq!(ids, vec![Value::Int(11), Value::Int(12)]);

    // A cycle back to the first node stops the walk.
    f.w32(0x11518, 0x11500);
    assert_eq!(units.len().unwrap(), 2);

    units.set_index(1, &Value::Record(vec![("id".into(), Value::Int(99))])).unwrap();
    assert_eq!(f.r32(0x11704), 99);
}

#[test]
fn bit_vector() {
    let f = Fixture::new();
    let seen = WORLD + 80;
    f.w32(seen, 0x11800);
    f.w32(seen + 4, 0x11800);
    f.w32(seen + 8, 0x11808);

    let world = f.world();
    let bits = world.field_view("seen").unwrap();
    for b in [true, false, true] {
        bits.push(&Value::Bool(b)).unwrap();
    }
    assert_eq!(
        bits.snapshot(0).unwrap(),
        Value::List(vec![Value::Bool(true), Value::Bool(false), Value::Bool(true)])
    );
    world
        .set_field("seen", &Value::List(vec![Value::Bool(false)]))
        .unwrap();
    assert_eq!(bits.len().unwrap(), 1);
    assert_eq!(value(bits.pop().unwrap().unwrap()), Value::Bool(false));
    assert!(bits.pop().unwrap().is_none());
}

#[test]
fn narrow_vector_and_clear() {
    let f = Fixture::new();
    let small = WORLD + 96;
    f.w32(small, 0x11900);
    f.w32(small + 4, 0x11900);
    f.w32(small + 8, 0x11910);

    let vec = f.world().field_view("small").unwrap();
    vec.set_index(0, &Value::Int(-1)).unwrap();
    vec.insert_at(0, &Value::Int(5)).unwrap();
    vec.push(&Value::Int(300)).unwrap();
    assert_eq!(ints(&vec), vec![5, -1, 300]);
    assert_eq!(f.r32(small + 4), 0x11906);
    vec.delete_at(1).unwrap();
    assert_eq!(ints(&vec), vec![5, 300]);
    vec.clear().unwrap();
    assert!(vec.is_empty().unwrap());
}

#[test]
fn scalars_and_bitfields() {
    let f = Fixture::new();
    let world = f.world();

    world.set_field("temp", &Value::Float(1.5)).unwrap();
    assert_eq!(value(world.field("temp").unwrap()), Value::Float(1.5));

    world.set_field("big", &Value::Int(-2)).unwrap();
    assert_eq!(f.r32(WORLD + 112), 0xffff_fffe);
    assert_eq!(f.r32(WORLD + 116), 0xffff_ffff);
    assert_eq!(value(world.field("big").unwrap()), Value::Int(-2));

    f.w32(WORLD + 120, 0xffff_ffff);
    world.set_field("mode", &Value::UInt(2)).unwrap();
    assert_eq!(f.r32(WORLD + 120), 0xffff_ffaf);
    assert_eq!(value(world.field("mode").unwrap()), Value::UInt(2));
    world.set_field("paused", &Value::Bool(false)).unwrap();
    assert_eq!(value(world.field("paused").unwrap()), Value::Bool(false));
    assert_eq!(f.r32(WORLD + 120), 0xffff_ffae);
}

fn make_rtti(f: &Fixture, vptr: u32, locator: u32, name: &str) {
    let type_descriptor = locator + 0x40;
    f.w32(vptr - 4, locator);
    f.w32(locator + 0xc, type_descriptor);
    let decorated = format!(".?AV{}@@\0", name);
    f.provider
        .memory()
        .write(type_descriptor + 8, decorated.as_bytes())
        .unwrap();
}

#[test]
fn polymorphic_pointer_and_snapshot() {
    let f = Fixture::new();
    make_rtti(&f, 0x12004, 0x12100, "building_workshopst");
    f.w32(0x12200, 0x12004);
    f.w32(0x12204, 77);
    f.w32(0x12208, 4);

    let world = f.world();
    let pointer = world.field_view("building").unwrap();
    assert_eq!(world.snapshot(1).unwrap().as_record().unwrap()[12].1, Value::Null);

    pointer.set_target(0x12200).unwrap();
    let building = pointer.deref().unwrap().unwrap();
    assert_eq!(building.compound().unwrap().type_name(), "building_workshop");
    pointer
        .set(&Value::Record(vec![("kind".into(), Value::UInt(9))]))
        .unwrap();
    assert_eq!(f.r32(0x12208) & 0xffff, 9);

    let json = serde_json::to_value(world.snapshot(1).unwrap()).unwrap();
    assert_eq!(json["building"]["id"], 77);
    assert_eq!(json["building"]["kind"], 9);
    let shallow = serde_json::to_value(world.snapshot(0).unwrap()).unwrap();
    assert_eq!(shallow["building"], 0x12200);
}
