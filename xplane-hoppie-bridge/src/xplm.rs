//! Production `XplmApi`: raw XPLM calls plus the owned-dataref table.

use std::ffi::{c_void, CString};

use hoppie_bridge::{DataRefHandle, XplmApi};
use tracing::warn;

use crate::owned::{self, OwnedValue};
use crate::xplm_sys;

pub struct RealXplm;

impl RealXplm {
    fn register(&self, path: &str, value: OwnedValue) -> Option<DataRefHandle> {
        if let Some(handle) = owned::handle_of(path) {
            return Some(handle);
        }
        let c = CString::new(path).ok()?;
        let is_int = matches!(value, OwnedValue::Int(_));
        let index = owned::reserve(path, value);
        let refcon = index as *mut c_void;

        let h = unsafe {
            if is_int {
                xplm_sys::XPLMRegisterDataAccessor(
                    c.as_ptr(), xplm_sys::XPLM_TYPE_INT, 1,
                    Some(owned::read_int), Some(owned::write_int),
                    None, None, None, None, None, None, None, None,
                    None, None,
                    refcon, refcon,
                )
            } else {
                xplm_sys::XPLMRegisterDataAccessor(
                    c.as_ptr(), xplm_sys::XPLM_TYPE_DATA, 1,
                    None, None,
                    None, None, None, None, None, None, None, None,
                    Some(owned::read_bytes), Some(owned::write_bytes),
                    refcon, refcon,
                )
            }
        };
        if h.is_null() {
            warn!(path, "XPLMRegisterDataAccessor failed");
            return None;
        }
        owned::attach(index, h as usize);
        Some(h as usize)
    }
}

impl XplmApi for RealXplm {
    fn find_dataref(&self, path: &str) -> Option<DataRefHandle> {
        let c = CString::new(path).ok()?;
        let h = unsafe { xplm_sys::XPLMFindDataRef(c.as_ptr()) };
        if h.is_null() { None } else { Some(h as usize) }
    }

    fn register_int(&self, path: &str) -> Option<DataRefHandle> {
        self.register(path, OwnedValue::Int(0))
    }

    fn register_string(&self, path: &str) -> Option<DataRefHandle> {
        self.register(path, OwnedValue::Bytes(Vec::new()))
    }

    fn get_int(&self, handle: DataRefHandle) -> i32 {
        match owned::get(handle) {
            Some(v) => v.int(),
            None => unsafe { xplm_sys::XPLMGetDatai(handle as _) },
        }
    }

    fn set_int(&self, handle: DataRefHandle, value: i32) {
        if !owned::set(handle, OwnedValue::Int(value)) {
            unsafe { xplm_sys::XPLMSetDatai(handle as _, value) }
        }
    }

    fn get_string(&self, handle: DataRefHandle) -> String {
        if let Some(v) = owned::get(handle) {
            return v.text();
        }
        unsafe {
            let len = xplm_sys::XPLMGetDatab(handle as _, std::ptr::null_mut(), 0, 0);
            let Ok(size) = usize::try_from(len) else { return String::new() };
            let mut buf = vec![0u8; size];
            let n = xplm_sys::XPLMGetDatab(handle as _, buf.as_mut_ptr().cast(), 0, len);
            buf.truncate(usize::try_from(n).unwrap_or(0));
            OwnedValue::Bytes(buf).text()
        }
    }

    fn set_string(&self, handle: DataRefHandle, value: &str) {
        if owned::set(handle, OwnedValue::Bytes(value.as_bytes().to_vec())) {
            return;
        }
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        let Ok(len) = i32::try_from(bytes.len()) else { return };
        unsafe { xplm_sys::XPLMSetDatab(handle as _, bytes.as_mut_ptr().cast(), 0, len) }
    }
}

/// Withdraw every published dataref (plugin disable).
pub fn unregister_owned() {
    for handle in owned::drain() {
        unsafe { xplm_sys::XPLMUnregisterDataAccessor(handle as _) }
    }
}
