//! X-Plane 12 HoppieBridge plugin.
//!
//! Compiles to a `.xpl` shared library loaded by X-Plane. The `XPLM*` entry
//! points below are only present in non-test builds; the bridge engine itself
//! lives in `hoppie-bridge` and is tested there against `MemoryXplm`.

pub mod owned;

#[cfg(not(test))]
mod log;
#[cfg(not(test))]
mod xplm;

// Raw X-Plane SDK extern declarations, only needed for production builds.
// Symbols are resolved at runtime by X-Plane when the .xpl is loaded.
#[cfg(not(test))]
pub(crate) mod xplm_sys {
    use std::ffi::{c_char, c_float, c_int, c_void};

    pub type XPLMDataRef = *mut c_void;
    pub type XPLMDataTypeID = c_int;

    pub const XPLM_TYPE_INT: XPLMDataTypeID  = 1;
    pub const XPLM_TYPE_DATA: XPLMDataTypeID = 32;

    pub type GetDatai = Option<unsafe extern "C" fn(*mut c_void) -> c_int>;
    pub type SetDatai = Option<unsafe extern "C" fn(*mut c_void, c_int)>;
    pub type GetDatab = Option<unsafe extern "C" fn(*mut c_void, *mut c_void, c_int, c_int) -> c_int>;
    pub type SetDatab = Option<unsafe extern "C" fn(*mut c_void, *mut c_void, c_int, c_int)>;
    /// Accessor slots this plugin never fills (float, double, arrays).
    pub type Unused = Option<unsafe extern "C" fn()>;

    extern "C" {
        pub fn XPLMFindDataRef(inDataRefName: *const c_char) -> XPLMDataRef;
        pub fn XPLMGetDatai(inDataRef: XPLMDataRef) -> c_int;
        pub fn XPLMSetDatai(inDataRef: XPLMDataRef, inValue: c_int);
        pub fn XPLMGetDatab(
            inDataRef: XPLMDataRef,
            outValue:  *mut c_void,
            inOffset:  c_int,
            inMaxBytes: c_int,
        ) -> c_int;
        pub fn XPLMSetDatab(
            inDataRef: XPLMDataRef,
            inValue:   *mut c_void,
            inOffset:  c_int,
            inLength:  c_int,
        );
        pub fn XPLMRegisterDataAccessor(
            inDataName:        *const c_char,
            inDataType:        XPLMDataTypeID,
            inIsWritable:      c_int,
            inReadInt:         GetDatai,
            inWriteInt:        SetDatai,
            inReadFloat:       Unused,
            inWriteFloat:      Unused,
            inReadDouble:      Unused,
            inWriteDouble:     Unused,
            inReadIntArray:    Unused,
            inWriteIntArray:   Unused,
            inReadFloatArray:  Unused,
            inWriteFloatArray: Unused,
            inReadData:        GetDatab,
            inWriteData:       SetDatab,
            inReadRefcon:      *mut c_void,
            inWriteRefcon:     *mut c_void,
        ) -> XPLMDataRef;
        pub fn XPLMUnregisterDataAccessor(inDataRef: XPLMDataRef);
        pub fn XPLMDebugString(inString: *const c_char);
        pub fn XPLMGetPrefsPath(outPrefsPath: *mut c_char);
        pub fn XPLMEnableFeature(inFeature: *const c_char, inEnable: c_int);
        pub fn XPLMRegisterFlightLoopCallback(
            inFlightLoop: Option<
                unsafe extern "C" fn(f32, f32, c_int, *mut c_void) -> f32,
            >,
            inInterval: c_float,
            inRefcon:   *mut c_void,
        );
        pub fn XPLMUnregisterFlightLoopCallback(
            inFlightLoop: Option<
                unsafe extern "C" fn(f32, f32, c_int, *mut c_void) -> f32,
            >,
            inRefcon: *mut c_void,
        );
    }
}

// ── XPLM entry points (production only) ──────────────────────────────────────

#[cfg(not(test))]
mod entry {
    use super::xplm::RealXplm;
    use hoppie_bridge::{BridgeConfig, BridgePlugin, HttpTransport, SETTINGS_FILE};
    use std::ffi::{c_char, c_int, c_void, CStr, CString};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex, OnceLock};
    use tracing::{error, info, warn};

    static PLUGIN: OnceLock<Mutex<BridgePlugin>> = OnceLock::new();

    #[no_mangle]
    pub unsafe extern "C" fn XPluginStart(
        out_name: *mut c_char,
        out_sig:  *mut c_char,
        out_desc: *mut c_char,
    ) -> c_int {
        write_cstr(out_name, "HoppieBridge");
        write_cstr(out_sig,  "hoppiebridge.plugin");
        write_cstr(out_desc, "Datarefs for Hoppie's ACARS");

        super::log::init();

        let config = BridgeConfig::default();
        let transport = Arc::new(HttpTransport::new(&config));
        let mut plugin = BridgePlugin::new(Box::new(RealXplm), transport, config);
        if let Some(path) = settings_path() {
            plugin = plugin.with_settings_file(path);
        }

        if PLUGIN.set(Mutex::new(plugin)).is_err() {
            error!("PLUGIN already initialized");
            return 0;
        }

        info!(version = env!("CARGO_PKG_VERSION"), "XPluginStart OK");
        1
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginStop() {
        info!("XPluginStop");
        // The static is never dropped; the state lives until the library unloads.
        if let Some(Ok(mut plugin)) = PLUGIN.get().map(Mutex::lock) {
            plugin.shutdown();
        }
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginEnable() -> c_int {
        let Some(plugin) = PLUGIN.get() else {
            error!("XPluginEnable: plugin not initialized");
            return 0;
        };
        let interval = match plugin.lock() {
            Ok(mut p) => {
                p.bind_datarefs();
                p.config().tick_interval.as_secs_f32()
            }
            Err(_) => {
                error!("XPluginEnable: plugin lock poisoned");
                return 0;
            }
        };

        super::xplm_sys::XPLMRegisterFlightLoopCallback(
            Some(flight_loop_cb),
            interval,
            std::ptr::null_mut(),
        );
        info!("XPluginEnable OK");
        1
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginDisable() {
        super::xplm_sys::XPLMUnregisterFlightLoopCallback(
            Some(flight_loop_cb),
            std::ptr::null_mut(),
        );
        if let Some(Ok(mut p)) = PLUGIN.get().map(Mutex::lock) {
            p.shutdown();
        }
        super::xplm::unregister_owned();
        info!("XPluginDisable");
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginReceiveMessage(
        _from:  c_int,
        _msg:   c_int,
        _param: *mut c_void,
    ) {
        // No inter-plugin messages handled.
    }

    unsafe extern "C" fn flight_loop_cb(
        _since_last_call:  f32,
        _since_last_floop: f32,
        _counter:          c_int,
        _refcon:           *mut c_void,
    ) -> f32 {
        if let Some(plugin) = PLUGIN.get() {
            if let Ok(mut p) = plugin.lock() {
                return p.flight_loop_tick();
            }
        }
        hoppie_bridge::config::TICK_INTERVAL.as_secs_f32()
    }

    /// `hoppiebridge.prf` next to X-Plane's own preference files.
    fn settings_path() -> Option<PathBuf> {
        let mut buf = [0 as c_char; 1024];
        unsafe {
            if let Ok(feature) = CString::new("XPLM_USE_NATIVE_PATHS") {
                super::xplm_sys::XPLMEnableFeature(feature.as_ptr(), 1);
            }
            super::xplm_sys::XPLMGetPrefsPath(buf.as_mut_ptr());
        }
        let raw = unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned();
        match Path::new(&raw).parent() {
            Some(dir) if !raw.is_empty() => Some(dir.join(SETTINGS_FILE)),
            _ => {
                warn!("no preferences directory, logon will not be saved");
                None
            }
        }
    }

    unsafe fn write_cstr(dst: *mut c_char, s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.len().min(255);
        std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, dst, len);
        *dst.add(len) = 0;
    }
}
