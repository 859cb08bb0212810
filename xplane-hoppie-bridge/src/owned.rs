//! Storage behind the datarefs this plugin publishes.
//!
//! X-Plane reads and writes owned datarefs through the accessor callbacks
//! below; the refcon passed to each callback is the slot index. `RealXplm`
//! reads the same slots directly by handle.

use std::ffi::{c_int, c_void};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedValue {
    Int(i32),
    Bytes(Vec<u8>),
}

impl OwnedValue {
    /// Text up to the first NUL.
    pub fn text(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Bytes(b) => {
                let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
                String::from_utf8_lossy(&b[..end]).into_owned()
            }
        }
    }

    pub fn int(&self) -> i32 {
        match self {
            Self::Int(v) => *v,
            Self::Bytes(_) => self.text().trim().parse().unwrap_or(0),
        }
    }
}

struct Slot {
    path:   String,
    handle: Option<usize>,
    value:  OwnedValue,
}

static OWNED: Mutex<Vec<Slot>> = Mutex::new(Vec::new());

fn table() -> MutexGuard<'static, Vec<Slot>> {
    OWNED.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Table ─────────────────────────────────────────────────────────────────────

/// Handle of an already published dataref.
pub fn handle_of(path: &str) -> Option<usize> {
    table().iter().find(|s| s.path == path).and_then(|s| s.handle)
}

/// Reserve a slot; returns its index (the accessor refcon).
pub fn reserve(path: &str, value: OwnedValue) -> usize {
    let mut t = table();
    t.push(Slot { path: path.to_string(), handle: None, value });
    t.len() - 1
}

/// Record the handle X-Plane returned for slot `index`.
pub fn attach(index: usize, handle: usize) {
    if let Some(slot) = table().get_mut(index) {
        slot.handle = Some(handle);
    }
}

pub fn get(handle: usize) -> Option<OwnedValue> {
    table().iter().find(|s| s.handle == Some(handle)).map(|s| s.value.clone())
}

/// Overwrite an owned value. False if `handle` is not ours.
pub fn set(handle: usize, value: OwnedValue) -> bool {
    match table().iter_mut().find(|s| s.handle == Some(handle)) {
        Some(slot) => {
            slot.value = value;
            true
        }
        None => false,
    }
}

/// Empty the table, returning the handles to unregister.
pub fn drain() -> Vec<usize> {
    table().drain(..).filter_map(|s| s.handle).collect()
}

// ── Byte helpers ──────────────────────────────────────────────────────────────

/// Copy `bytes[offset..]` into `out`; returns the count copied.
fn copy_out(bytes: &[u8], offset: usize, out: &mut [u8]) -> usize {
    let src = bytes.get(offset..).unwrap_or_default();
    let n = src.len().min(out.len());
    out[..n].copy_from_slice(&src[..n]);
    n
}

/// Replace everything from `offset` on with `data`.
fn splice_in(bytes: &mut Vec<u8>, offset: usize, data: &[u8]) {
    bytes.resize(offset, 0);
    bytes.extend_from_slice(data);
}

// ── Accessor callbacks ────────────────────────────────────────────────────────

pub unsafe extern "C" fn read_int(refcon: *mut c_void) -> c_int {
    table().get(refcon as usize).map_or(0, |s| s.value.int())
}

pub unsafe extern "C" fn write_int(refcon: *mut c_void, value: c_int) {
    if let Some(slot) = table().get_mut(refcon as usize) {
        slot.value = OwnedValue::Int(value);
    }
}

/// With a null `out`, reports the full length in bytes.
pub unsafe extern "C" fn read_bytes(
    refcon: *mut c_void,
    out:    *mut c_void,
    offset: c_int,
    max:    c_int,
) -> c_int {
    let t = table();
    let Some(OwnedValue::Bytes(bytes)) = t.get(refcon as usize).map(|s| &s.value) else {
        return 0;
    };
    if out.is_null() {
        return c_int::try_from(bytes.len()).unwrap_or(c_int::MAX);
    }
    let (Ok(offset), Ok(max)) = (usize::try_from(offset), usize::try_from(max)) else {
        return 0;
    };
    let dst = std::slice::from_raw_parts_mut(out.cast::<u8>(), max);
    c_int::try_from(copy_out(bytes, offset, dst)).unwrap_or(0)
}

pub unsafe extern "C" fn write_bytes(
    refcon: *mut c_void,
    value:  *mut c_void,
    offset: c_int,
    len:    c_int,
) {
    let (Ok(offset), Ok(len)) = (usize::try_from(offset), usize::try_from(len)) else {
        return;
    };
    if value.is_null() {
        return;
    }
    let data = std::slice::from_raw_parts(value.cast::<u8>(), len);
    if let Some(slot) = table().get_mut(refcon as usize) {
        match &mut slot.value {
            OwnedValue::Bytes(bytes) => splice_in(bytes, offset, data),
            other => *other = OwnedValue::Bytes(data.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refcon(index: usize) -> *mut c_void {
        index as *mut c_void
    }

    #[test]
    fn text_stops_at_nul() {
        assert_eq!(OwnedValue::Bytes(b"ACARS ready\0junk".to_vec()).text(), "ACARS ready");
        assert_eq!(OwnedValue::Int(7).text(), "7");
        assert_eq!(OwnedValue::Bytes(b" 1 ".to_vec()).int(), 1);
    }

    #[test]
    fn splice_replaces_tail() {
        let mut bytes = b"HELLO WORLD".to_vec();
        splice_in(&mut bytes, 6, b"TOWER");
        assert_eq!(bytes, b"HELLO TOWER");
        splice_in(&mut bytes, 0, b"OK");
        assert_eq!(bytes, b"OK");
        splice_in(&mut bytes, 4, b"X");
        assert_eq!(bytes, b"OK\0\0X");
    }

    #[test]
    fn copy_out_respects_offset_and_room() {
        let mut out = [0u8; 4];
        assert_eq!(copy_out(b"DLH42", 1, &mut out), 4);
        assert_eq!(&out, b"LH42");
        assert_eq!(copy_out(b"DLH42", 9, &mut out), 0);
    }

    #[test]
    fn callbacks_round_trip_through_slot() {
        let idx = reserve("hoppiebridge/test/callbacks", OwnedValue::Bytes(Vec::new()));
        attach(idx, 0xB00F);

        let mut text = b"DLH42\0".to_vec();
        unsafe {
            write_bytes(refcon(idx), text.as_mut_ptr().cast(), 0, 6);
            assert_eq!(read_bytes(refcon(idx), std::ptr::null_mut(), 0, 0), 6);

            let mut out = [0u8; 16];
            let n = read_bytes(refcon(idx), out.as_mut_ptr().cast(), 0, 16);
            assert_eq!(&out[..n as usize], b"DLH42\0");
        }
        assert_eq!(get(0xB00F).map(|v| v.text()).as_deref(), Some("DLH42"));
        assert_eq!(handle_of("hoppiebridge/test/callbacks"), Some(0xB00F));
    }

    #[test]
    fn int_slot_via_handle_and_callback() {
        let idx = reserve("hoppiebridge/test/int", OwnedValue::Int(0));
        attach(idx, 0xC0DE);

        assert!(set(0xC0DE, OwnedValue::Int(1)));
        unsafe {
            assert_eq!(read_int(refcon(idx)), 1);
            write_int(refcon(idx), 0);
        }
        assert_eq!(get(0xC0DE), Some(OwnedValue::Int(0)));
        assert!(!set(0xDEAD_0000, OwnedValue::Int(1)));
    }
}
