//! Late-bound IDispatch access and VARIANT conversions.
//!
//! Excel's object model is reached through IDispatch, the way VBScript does it:
//! every property get/put and method call goes through one `Invoke` helper.

#![cfg(windows)]

use std::mem::ManuallyDrop;
use std::ptr;

use windows::{
    core::{BSTR, GUID, HSTRING, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CLSIDFromProgID, CoCreateInstance, IDispatch, CLSCTX_LOCAL_SERVER, DISPATCH_FLAGS,
                DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS,
                EXCEPINFO, SAFEARRAY,
            },
            Ole::{
                SafeArrayGetDim, SafeArrayGetElement, SafeArrayGetLBound, SafeArrayGetUBound,
                DISPID_PROPERTYPUT,
            },
            Variant::{
                VARIANT, VT_ARRAY, VT_BOOL, VT_BSTR, VT_DATE, VT_DISPATCH, VT_EMPTY, VT_ERROR,
                VT_I2, VT_I4, VT_NULL, VT_R4, VT_R8, VT_VARIANT,
            },
        },
    },
};

// -- VARIANT construction helpers --
// The VARIANT struct wraps inner unions in ManuallyDrop, so we use ptr::write
// to set fields without triggering the DerefMut lint.

/// Create an empty VARIANT.
pub fn variant_empty() -> VARIANT {
    VARIANT::default()
}

/// Create a VARIANT containing a bool.
pub fn variant_bool(val: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

/// Create a VARIANT containing an f64.
pub fn variant_f64(val: f64) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_R8);
        ptr::write(&mut inner.Anonymous.dblVal, val);
        v
    }
}

/// Create a VARIANT containing an i32.
pub fn variant_i32(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

/// Create a VARIANT containing a BSTR string.
pub fn variant_str(val: &str) -> VARIANT {
    unsafe {
        let bstr = BSTR::from(val);
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(bstr));
        v
    }
}

/// Get the VT type of a VARIANT.
pub fn variant_vt(v: &VARIANT) -> u16 {
    unsafe { v.Anonymous.Anonymous.vt.0 }
}

/// Extract a bool from a VARIANT.
pub fn variant_get_bool(v: &VARIANT) -> Option<bool> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BOOL {
            Some(v.Anonymous.Anonymous.Anonymous.boolVal.0 != 0)
        } else {
            None
        }
    }
}

/// Extract an f64 from a VARIANT.
pub fn variant_get_f64(v: &VARIANT) -> Option<f64> {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        let anon = &v.Anonymous.Anonymous.Anonymous;
        if vt == VT_R8 {
            Some(anon.dblVal)
        } else if vt == VT_R4 {
            Some(anon.fltVal as f64)
        } else if vt == VT_I4 {
            Some(anon.lVal as f64)
        } else if vt == VT_I2 {
            Some(anon.iVal as f64)
        } else if vt == VT_DATE {
            // OLE automation dates are day serials, same as the cell's number
            Some(anon.date)
        } else {
            None
        }
    }
}

/// Extract a string from a VARIANT.
pub fn variant_get_string(v: &VARIANT) -> Option<String> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BSTR {
            let bstr = &v.Anonymous.Anonymous.Anonymous.bstrVal;
            Some(bstr.to_string())
        } else {
            None
        }
    }
}

/// Extract an IDispatch from a VARIANT.
pub fn variant_get_dispatch(v: &VARIANT) -> Option<IDispatch> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_DISPATCH {
            // pdispVal is ManuallyDrop<Option<IDispatch>>
            let opt_disp: &Option<IDispatch> = &v.Anonymous.Anonymous.Anonymous.pdispVal;
            opt_disp.clone()
        } else {
            None
        }
    }
}

/// Check if a VARIANT is empty or null.
pub fn variant_is_empty(v: &VARIANT) -> bool {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        vt == VT_EMPTY || vt == VT_NULL
    }
}

/// Extract the code of a VT_ERROR VARIANT (e.g. 2007 for `#DIV/0!`).
pub fn variant_get_error_code(v: &VARIANT) -> Option<u16> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_ERROR {
            // SCODE is 0x800A0000 | code
            Some((v.Anonymous.Anonymous.Anonymous.scode & 0xFFFF) as u16)
        } else {
            None
        }
    }
}

/// Read a 2-D `VT_ARRAY | VT_VARIANT` (as returned by `Range.Value`) into rows.
///
/// Returns `Ok(None)` if the VARIANT is not an array.
pub fn variant_get_rows(v: &VARIANT) -> Result<Option<Vec<Vec<VARIANT>>>, String> {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        if vt.0 != (VT_ARRAY.0 | VT_VARIANT.0) {
            return Ok(None);
        }
        let psa: *const SAFEARRAY = v.Anonymous.Anonymous.Anonymous.parray;
        if psa.is_null() {
            return Ok(Some(Vec::new()));
        }
        if SafeArrayGetDim(psa) != 2 {
            return Err("expected a 2-dimensional array".to_string());
        }

        let bound = |dim: u32| -> Result<(i32, i32), String> {
            let lower =
                SafeArrayGetLBound(psa, dim).map_err(|e| format!("SafeArrayGetLBound: {e}"))?;
            let upper =
                SafeArrayGetUBound(psa, dim).map_err(|e| format!("SafeArrayGetUBound: {e}"))?;
            Ok((lower, upper))
        };
        let (row_lo, row_hi) = bound(1)?;
        let (col_lo, col_hi) = bound(2)?;

        let mut rows = Vec::with_capacity((row_hi - row_lo + 1).max(0) as usize);
        for r in row_lo..=row_hi {
            let mut row = Vec::with_capacity((col_hi - col_lo + 1).max(0) as usize);
            for c in col_lo..=col_hi {
                let indices = [r, c];
                let mut element = VARIANT::default();
                SafeArrayGetElement(
                    psa,
                    indices.as_ptr(),
                    &mut element as *mut VARIANT as *mut std::ffi::c_void,
                )
                .map_err(|e| format!("SafeArrayGetElement({r}, {c}): {e}"))?;
                row.push(element);
            }
            rows.push(row);
        }
        Ok(Some(rows))
    }
}

// -- DispatchObject --

/// A wrapper around an IDispatch COM object providing ergonomic access.
#[derive(Clone)]
pub struct DispatchObject {
    inner: IDispatch,
}

impl DispatchObject {
    /// Create a COM object from a ProgID string (e.g., "Excel.Application").
    pub fn create_from_progid(progid: &str) -> Result<Self, String> {
        unsafe {
            let hstr = HSTRING::from(progid);
            let clsid =
                CLSIDFromProgID(&hstr).map_err(|e| format!("CLSIDFromProgID failed: {e}"))?;
            let disp: IDispatch = CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER)
                .map_err(|e| format!("CoCreateInstance failed for '{progid}': {e}"))?;
            Ok(Self { inner: disp })
        }
    }

    /// Look up the DISPID for a member name.
    fn get_dispid(&self, name: &str) -> Result<i32, String> {
        unsafe {
            let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
            let names = [PCWSTR(wide.as_ptr())];
            let mut dispid = 0i32;
            self.inner
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    GetSystemDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| format!("GetIDsOfNames('{name}') failed: {e}"))?;
            Ok(dispid)
        }
    }

    /// `IDispatch::Invoke` with positional arguments in natural order.
    ///
    /// Property puts pass the new value as the last argument.
    fn invoke(
        &self,
        name: &str,
        flags: DISPATCH_FLAGS,
        args: &[VARIANT],
    ) -> Result<VARIANT, String> {
        let dispid = self.get_dispid(name)?;
        // DISPPARAMS requires arguments in reverse order
        let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
        let mut named_args = [DISPID_PROPERTYPUT];
        let is_put = flags == DISPATCH_PROPERTYPUT;
        let params = DISPPARAMS {
            rgvarg: if reversed.is_empty() {
                ptr::null_mut()
            } else {
                reversed.as_mut_ptr()
            },
            rgdispidNamedArgs: if is_put {
                named_args.as_mut_ptr()
            } else {
                ptr::null_mut()
            },
            cArgs: reversed.len() as u32,
            cNamedArgs: u32::from(is_put),
        };
        let mut result = VARIANT::default();
        let mut except = EXCEPINFO::default();
        unsafe {
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    flags,
                    &params,
                    if is_put { None } else { Some(&mut result) },
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
        }
        Ok(result)
    }

    /// Get a property value. Equivalent to VB's `obj.PropertyName`.
    pub fn get_property(&self, name: &str) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_PROPERTYGET, &[])
    }

    /// Set a property value. Equivalent to VB's `obj.PropertyName = value`.
    pub fn set_property(&self, name: &str, value: VARIANT) -> Result<(), String> {
        self.invoke(name, DISPATCH_PROPERTYPUT, &[value])?;
        Ok(())
    }

    /// Invoke a method with arguments in natural order.
    pub fn invoke_method(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_METHOD, args)
    }

    /// Get a child object (property that returns an IDispatch).
    pub fn get_child(&self, name: &str) -> Result<DispatchObject, String> {
        let variant = self.get_property(name)?;
        extract_dispatch(&variant, name)
    }

    /// Invoke a method and extract the returned IDispatch object.
    pub fn invoke_child(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        let variant = self.invoke_method(name, args)?;
        extract_dispatch(&variant, name)
    }

    /// Get an indexed property that returns an object, e.g. `Worksheets.Item("Sheet1")`
    /// or `Cells(row, column)`.
    pub fn get_indexed(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        let variant = self.invoke(name, DISPATCH_PROPERTYGET, args)?;
        extract_dispatch(&variant, name)
    }
}

/// Extract an IDispatch from a VARIANT, with a descriptive error.
fn extract_dispatch(variant: &VARIANT, context: &str) -> Result<DispatchObject, String> {
    if let Some(disp) = variant_get_dispatch(variant) {
        Ok(DispatchObject { inner: disp })
    } else if variant_is_empty(variant) {
        Err(format!("'{context}' returned empty/null"))
    } else {
        let vt = variant_vt(variant);
        Err(format!(
            "'{context}' returned non-object VARIANT (VT={vt}), expected VT_DISPATCH"
        ))
    }
}

/// Format an Invoke error, including EXCEPINFO details if available.
fn format_invoke_error(err: windows::core::Error, except: &EXCEPINFO, member_name: &str) -> String {
    let code = err.code().0 as u32;
    if code == DISP_E_EXCEPTION.0 as u32 {
        let desc = if !except.bstrDescription.is_empty() {
            except.bstrDescription.to_string()
        } else {
            String::from("(no description)")
        };
        let source = if !except.bstrSource.is_empty() {
            except.bstrSource.to_string()
        } else {
            String::from("(no source)")
        };
        format!("COM exception in '{member_name}': {desc} (source: {source})")
    } else {
        format!("Invoke('{member_name}') failed: {err}")
    }
}
