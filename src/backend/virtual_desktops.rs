//! Windows virtual desktops.
//!
//! [`VirtualDesktopsClient`] owns every COM object the backend needs.  COM
//! is initialised for the calling thread when the client is built and
//! released when it is dropped; nothing else in the crate sees COM types.
//!
//! The public `IVirtualDesktopManager` only maps windows to desktop GUIDs.
//! The ordered list of desktops and their names come from Explorer's
//! registry keys.

use super::BackendError;
use log::debug;
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use windows::core::{w, GUID, HSTRING};
use windows::Win32::Foundation::HWND;
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_APARTMENTTHREADED,
};
use windows::Win32::System::Registry::{
    RegGetValueW, HKEY_CURRENT_USER, RRF_RT_REG_BINARY, RRF_RT_REG_SZ,
};
use windows::Win32::UI::Shell::{IVirtualDesktopManager, VirtualDesktopManager};

const DESKTOPS_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Explorer\VirtualDesktops";

/// One virtual desktop, in Task View order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desktop {
    pub id: GUID,
    /// Zero-based position.
    pub ordinal: u32,
    pub name: String,
}

pub struct VirtualDesktopsClient {
    /// Released before COM is uninitialised.
    manager: ManuallyDrop<IVirtualDesktopManager>,
}

/// Registry key name of a desktop: `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`.
fn braced(id: &GUID) -> String {
    let d4 = id.data4;
    format!(
        "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
        id.data1, id.data2, id.data3, d4[0], d4[1], d4[2], d4[3], d4[4], d4[5], d4[6], d4[7]
    )
}

/// Split the `VirtualDesktopIDs` blob into GUIDs.
fn parse_ids(blob: &[u8]) -> Vec<GUID> {
    blob.chunks_exact(16)
        .map(|b| {
            GUID::from_values(
                u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                u16::from_le_bytes([b[4], b[5]]),
                u16::from_le_bytes([b[6], b[7]]),
                [b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]],
            )
        })
        .collect()
}

fn read_binary(value: &HSTRING) -> Option<Vec<u8>> {
    let key = HSTRING::from(DESKTOPS_KEY);
    let mut size = 0u32;
    unsafe {
        RegGetValueW(HKEY_CURRENT_USER, &key, value, RRF_RT_REG_BINARY, None, None, Some(&mut size))
            .ok()
            .ok()?;
        let mut buf = vec![0u8; size as usize];
        RegGetValueW(
            HKEY_CURRENT_USER,
            &key,
            value,
            RRF_RT_REG_BINARY,
            None,
            Some(buf.as_mut_ptr() as *mut c_void),
            Some(&mut size),
        )
        .ok()
        .ok()?;
        buf.truncate(size as usize);
        Some(buf)
    }
}

fn read_name(id: &GUID) -> Option<String> {
    let key = HSTRING::from(format!(r"{}\Desktops\{}", DESKTOPS_KEY, braced(id)));
    let mut buf = [0u16; 256];
    let mut size = (buf.len() * 2) as u32;
    unsafe {
        RegGetValueW(
            HKEY_CURRENT_USER,
            &key,
            w!("Name"),
            RRF_RT_REG_SZ,
            None,
            Some(buf.as_mut_ptr() as *mut c_void),
            Some(&mut size),
        )
        .ok()
        .ok()?;
    }
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    Some(String::from_utf16_lossy(&buf[..len])).filter(|s| !s.is_empty())
}

impl VirtualDesktopsClient {
    /// Initialise COM on this thread and obtain the desktop manager.
    pub fn new() -> Result<Self, BackendError> {
        unsafe {
            CoInitializeEx(None, COINIT_APARTMENTTHREADED)
                .ok()
                .map_err(|e| BackendError::Unavailable(format!("CoInitializeEx: {}", e)))?;
            match CoCreateInstance(&VirtualDesktopManager, None, CLSCTX_ALL) {
                Ok(manager) => Ok(Self {
                    manager: ManuallyDrop::new(manager),
                }),
                Err(e) => {
                    CoUninitialize();
                    Err(BackendError::Unavailable(format!("IVirtualDesktopManager: {}", e)))
                }
            }
        }
    }

    /// Desktops in Task View order.
    pub fn get_desktops(&self) -> Vec<Desktop> {
        let ids = read_binary(&HSTRING::from("VirtualDesktopIDs"))
            .map(|blob| parse_ids(&blob))
            .unwrap_or_default();
        ids.into_iter()
            .enumerate()
            .map(|(ordinal, id)| Desktop {
                id,
                ordinal: ordinal as u32,
                name: read_name(&id).unwrap_or_else(|| format!("Desktop {}", ordinal + 1)),
            })
            .collect()
    }

    /// Ordinal of the desktop showing `hwnd`.
    pub fn get_window_desktop(&self, hwnd: HWND) -> Option<u32> {
        let id = unsafe { self.manager.GetWindowDesktopId(hwnd) }.ok()?;
        let found = self.get_desktops().into_iter().find(|d| d.id == id);
        if found.is_none() {
            debug!("window {:?} is on unlisted desktop {}", hwnd.0, braced(&id));
        }
        found.map(|d| d.ordinal)
    }

    /// Move `hwnd` to the desktop at `ordinal`.
    ///
    /// Explorer only honours this for windows of the calling process; other
    /// windows fail with a transient error.
    pub fn move_window_to_desktop(&self, hwnd: HWND, ordinal: u32) -> Result<(), BackendError> {
        let desktop = self
            .get_desktops()
            .into_iter()
            .find(|d| d.ordinal == ordinal)
            .ok_or_else(|| BackendError::Native(format!("no desktop at position {}", ordinal)))?;
        unsafe { self.manager.MoveWindowToDesktop(hwnd, &desktop.id) }
            .map_err(|e| BackendError::Native(format!("MoveWindowToDesktop: {}", e)))
    }
}

impl Drop for VirtualDesktopsClient {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.manager);
            CoUninitialize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ids_reads_little_endian_guids() {
        let mut blob = vec![
            0x78, 0x56, 0x34, 0x12, 0xbc, 0x9a, 0xf0, 0xde, 1, 2, 3, 4, 5, 6, 7, 8,
        ];
        blob.extend([0u8; 16]);
        blob.push(0xff);
        let ids = parse_ids(&blob);
        assert_eq!(ids.len(), 2);
        assert_eq!(braced(&ids[0]), "{12345678-9ABC-DEF0-0102-030405060708}");
    }
}
