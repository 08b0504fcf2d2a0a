//! Resolution against a real gcc-built image (`tests/fixtures/epoch_fw.c`).

use std::collections::BTreeMap;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use test_case::test_case;

use risc_debug_helper::error::TransportError;
use risc_debug_helper::firmware::{DwarfParser, Firmware, ImageParser, MemReader};

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/epoch_fw.elf")
}

fn firmware() -> Firmware {
    let files = BTreeMap::from([("fw".to_string(), fixture())]);
    Firmware::load(&files, None).unwrap()
}

#[test_case("fw.g_epoch", 0x4020, 72 ; "struct")]
#[test_case("fw.g_epoch.valid", 0x4024, 1 ; "member offset")]
#[test_case("fw.g_epoch.raw", 0x4028, 4 ; "anonymous union member")]
#[test_case("fw.g_epoch.half[1]", 0x402a, 2 ; "array inside anonymous union")]
#[test_case("fw.g_epoch.arr", 0x402c, 48 ; "two dimensional array")]
#[test_case("fw.g_epoch.arr[2]", 0x404c, 16 ; "array row")]
#[test_case("fw.g_epoch.arr[1][2]", 0x4044, 4 ; "array element")]
#[test_case("fw.g_cmd", 0x4008, 4 ; "enum variable")]
fn resolves_dwarf_layout(path: &str, address: u64, size: u64) {
    assert_eq!(firmware().parse_addr_size(path, None), Ok((address, size)));
}

#[test]
fn type_names_come_from_dwarf() {
    let fw = firmware();
    let image = fw.image("fw").unwrap();
    let (_, _, ty) = fw.parse_addr_size_type("fw.g_epoch.arr", None).unwrap();
    assert_eq!(image.types().display_name(ty), "unsigned int[3][4]");
    let epoch = image.type_by_name("epoch").unwrap();
    assert_eq!(image.types().size_of(epoch), Some(72));
}

#[test]
fn pointers_are_followed_through_the_reader() {
    let fw = firmware();
    let reader = |address: u64, size: usize| -> Result<Vec<u8>, TransportError> {
        let mut bytes = vec![0; size];
        if address == 0x4000 {
            bytes[..4].copy_from_slice(&0x4020u32.to_le_bytes());
        }
        Ok(bytes)
    };
    let reader: MemReader<'_> = &reader;
    assert_eq!(
        fw.parse_addr_size("fw.g_epoch_ptr->arr[1][2]", Some(reader)),
        Ok((0x4044, 4))
    );
    assert_eq!(fw.parse_addr_size("fw.g_epoch_ptr->next", Some(reader)), Ok((0x4060, 8)));
}

#[test]
fn enumerators_keep_unsigned_values() {
    assert_eq!(
        firmware().get_enum_mapping("fw.epoch_cmd").unwrap(),
        BTreeMap::from([
            (1, "EPOCH_CMD_VALID".to_string()),
            (2, "EPOCH_CMD_LOOP".to_string()),
            (0xff, "EPOCH_CMD_END".to_string()),
        ])
    );
}

#[test]
fn line_table_and_symtab() {
    let image = DwarfParser.parse("fw", &fixture()).unwrap();
    assert_eq!(image.path(), Some(fixture().as_path()));
    assert_eq!(image.describe_pc(0x1000), "main at /fw/epoch_fw.c:21");
    assert_eq!(image.describe_pc(0x1006), "main+0x6 at /fw/epoch_fw.c:22");
    assert_eq!(image.describe_pc(0x1018), "main+0x18 at /fw/epoch_fw.c:24");
    assert_eq!(image.function_at(0x101f).map(|f| f.name.as_str()), Some("main"));
}
