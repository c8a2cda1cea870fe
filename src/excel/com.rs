//! Live Windows COM backend for the host traits.
//!
//! Late-bound `IDispatch` automation against the running Excel instance. The
//! raw session re-reads `ActiveWorkbook` / `ActiveSheet` / `Selection` from
//! the application object on every call, which is what makes it a trustworthy
//! freshness source; the wrapper objects hold `IDispatch` pointers and are the
//! cached identities the acquirer cross-checks.
//!
//! Everything in this module must run on the worker thread that constructed
//! the gateway: the COM apartment is bound to it.

use std::iter::once;
use std::ptr;

use windows::core::{BSTR, GUID, PCWSTR, VARIANT};
use windows::Win32::Foundation::HWND;
use windows::Win32::System::Com::{
    CLSIDFromProgID, CoInitializeEx, CoUninitialize, IDispatch, DISPATCH_FLAGS, DISPATCH_METHOD,
    DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, COINIT_APARTMENTTHREADED,
};
use windows::Win32::System::Ole::{GetActiveObject, DISPID_PROPERTYPUT};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
};

use super::host::{
    CellRange, CellValue, HostError, HostGateway, RawSession, Workbook, WrapperApp, Worksheet,
};
use super::host_process_running;

const PROG_ID: &str = "Excel.Application";
const LOCALE_USER_DEFAULT: u32 = 0x0400;

/// Owns the COM apartment for the worker thread.
pub struct ComGateway {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ComGateway {
    pub fn new() -> Result<Self, HostError> {
        unsafe {
            CoInitializeEx(None, COINIT_APARTMENTTHREADED)
                .ok()
                .map_err(|e| HostError::Interop(format!("CoInitializeEx failed: {e}")))?;
        }
        Ok(Self {
            _not_send: std::marker::PhantomData,
        })
    }

    fn connect(&self) -> Result<IDispatch, HostError> {
        unsafe {
            let clsid = CLSIDFromProgID(PCWSTR(wide(PROG_ID).as_ptr()))
                .map_err(|e| HostError::Interop(format!("CLSIDFromProgID failed: {e}")))?;
            let mut unknown = None;
            if GetActiveObject(&clsid, ptr::null_mut(), &mut unknown).is_err() || unknown.is_none()
            {
                return Err(if host_process_running() {
                    HostError::Busy("running object table has no Excel entry".into())
                } else {
                    HostError::NotRunning
                });
            }
            unknown
                .unwrap()
                .cast()
                .map_err(|e| HostError::Interop(format!("IDispatch cast failed: {e}")))
        }
    }
}

impl Drop for ComGateway {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

impl HostGateway for ComGateway {
    fn raw(&self) -> Result<Box<dyn RawSession>, HostError> {
        Ok(Box::new(ComRawSession {
            app: self.connect()?,
        }))
    }

    fn wrapper(&self) -> Result<Box<dyn WrapperApp>, HostError> {
        Ok(Box::new(ComWrapperApp {
            app: self.connect()?,
        }))
    }

    fn pump_messages(&self) {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).into() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

struct ComRawSession {
    app: IDispatch,
}

impl RawSession for ComRawSession {
    fn version(&self) -> Result<String, HostError> {
        get_string(&self.app, "Version")
    }

    fn is_ready(&self) -> Result<bool, HostError> {
        let v = get(&self.app, "Ready", &[])?;
        bool::try_from(&v).map_err(|e| HostError::Interop(format!("Ready not a bool: {e}")))
    }

    fn active_workbook_name(&self) -> Result<Option<String>, HostError> {
        match get_object(&self.app, "ActiveWorkbook")? {
            Some(book) => Ok(Some(get_string(&book, "Name")?)),
            None => Ok(None),
        }
    }

    fn active_sheet_name(&self) -> Result<Option<String>, HostError> {
        match get_object(&self.app, "ActiveSheet")? {
            Some(sheet) => Ok(Some(get_string(&sheet, "Name")?)),
            None => Ok(None),
        }
    }

    fn selection_position(&self) -> Result<Option<(u32, u32)>, HostError> {
        match get_object(&self.app, "Selection")? {
            Some(sel) => {
                let row = get_i32(&sel, "Row")?;
                let column = get_i32(&sel, "Column")?;
                Ok(Some((row as u32, column as u32)))
            }
            None => Ok(None),
        }
    }

    fn set_screen_updating(&self, on: bool) -> Result<(), HostError> {
        put(&self.app, "ScreenUpdating", VARIANT::from(on))
    }

    fn recalculate(&self) -> Result<(), HostError> {
        call(&self.app, "Calculate", &[]).map(|_| ())
    }
}

struct ComWrapperApp {
    app: IDispatch,
}

impl WrapperApp for ComWrapperApp {
    fn version(&self) -> Result<String, HostError> {
        get_string(&self.app, "Version")
    }

    fn workbook_by_name(&self, name: &str) -> Result<Box<dyn Workbook>, HostError> {
        let workbooks = require_object(&self.app, "Workbooks")?;
        let book = require_dispatch(get(
            &workbooks,
            "Item",
            &[VARIANT::from(BSTR::from(name))],
        )?)?;
        Ok(Box::new(ComWorkbook { disp: book }))
    }

    fn active_workbook(&self) -> Result<Box<dyn Workbook>, HostError> {
        match get_object(&self.app, "ActiveWorkbook")? {
            Some(disp) => Ok(Box::new(ComWorkbook { disp })),
            None => Err(HostError::NoWorkbook),
        }
    }

    fn selection(&self) -> Result<Box<dyn CellRange>, HostError> {
        match get_object(&self.app, "Selection")? {
            Some(disp) => Ok(Box::new(ComRange { disp })),
            None => Err(HostError::NoSelection),
        }
    }
}

struct ComWorkbook {
    disp: IDispatch,
}

impl Workbook for ComWorkbook {
    fn name(&self) -> String {
        get_string(&self.disp, "Name").unwrap_or_default()
    }

    fn sheet_by_name(&self, name: &str) -> Result<Box<dyn Worksheet>, HostError> {
        let sheets = require_object(&self.disp, "Sheets")?;
        let sheet =
            require_dispatch(get(&sheets, "Item", &[VARIANT::from(BSTR::from(name))])?)?;
        Ok(Box::new(ComWorksheet { disp: sheet }))
    }

    fn active_sheet(&self) -> Result<Box<dyn Worksheet>, HostError> {
        match get_object(&self.disp, "ActiveSheet")? {
            Some(disp) => Ok(Box::new(ComWorksheet { disp })),
            None => Err(HostError::NoSheet),
        }
    }
}

struct ComWorksheet {
    disp: IDispatch,
}

impl ComWorksheet {
    fn cell(&self, row: u32, column: u32) -> Result<IDispatch, HostError> {
        require_dispatch(get(
            &self.disp,
            "Cells",
            &[VARIANT::from(row as i32), VARIANT::from(column as i32)],
        )?)
    }
}

impl Worksheet for ComWorksheet {
    fn name(&self) -> String {
        get_string(&self.disp, "Name").unwrap_or_default()
    }

    fn cell_value(&self, row: u32, column: u32) -> Result<CellValue, HostError> {
        let cell = self.cell(row, column)?;
        let value = get(&cell, "Value", &[])?;
        Ok(variant_to_cell_value(&value))
    }

    fn range(&self, row: u32, column: u32) -> Result<Box<dyn CellRange>, HostError> {
        Ok(Box::new(ComRange {
            disp: self.cell(row, column)?,
        }))
    }
}

struct ComRange {
    disp: IDispatch,
}

impl CellRange for ComRange {
    fn address(&self) -> String {
        get_string(&self.disp, "Address").unwrap_or_else(|_| "?".to_string())
    }

    fn row(&self) -> u32 {
        get_i32(&self.disp, "Row").unwrap_or(1).max(1) as u32
    }

    fn column(&self) -> u32 {
        get_i32(&self.disp, "Column").unwrap_or(1).max(1) as u32
    }

    fn cell_count(&self) -> u32 {
        get_i32(&self.disp, "Count").unwrap_or(1).max(1) as u32
    }

    fn sheet_name(&self) -> Result<String, HostError> {
        let sheet = require_object(&self.disp, "Worksheet")?;
        get_string(&sheet, "Name")
    }

    fn clear_notes(&self) -> Result<(), HostError> {
        call(&self.disp, "ClearComments", &[]).map(|_| ())
    }

    fn delete_note_object(&self) -> Result<(), HostError> {
        match get_object(&self.disp, "Comment")? {
            Some(comment) => call(&comment, "Delete", &[]).map(|_| ()),
            None => Ok(()),
        }
    }

    fn set_note(&self, text: &str) -> Result<(), HostError> {
        call(&self.disp, "AddComment", &[VARIANT::from(BSTR::from(text))]).map(|_| ())
    }

    fn note(&self) -> Result<Option<String>, HostError> {
        match get_object(&self.disp, "Comment")? {
            Some(comment) => {
                let v = call(&comment, "Text", &[])?;
                Ok(Some(
                    BSTR::try_from(&v).map(|b| b.to_string()).unwrap_or_default(),
                ))
            }
            None => Ok(None),
        }
    }
}

// --- IDispatch plumbing ---

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(once(0)).collect()
}

fn dispid(disp: &IDispatch, name: &str) -> Result<i32, HostError> {
    let wname = wide(name);
    let names = [PCWSTR(wname.as_ptr())];
    let mut id = 0i32;
    unsafe {
        disp.GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, LOCALE_USER_DEFAULT, &mut id)
            .map_err(|e| HostError::Interop(format!("no member '{name}': {e}")))?;
    }
    Ok(id)
}

fn invoke(
    disp: &IDispatch,
    name: &str,
    flags: DISPATCH_FLAGS,
    args: &[VARIANT],
) -> Result<VARIANT, HostError> {
    let id = dispid(disp, name)?;
    // COM expects arguments in reverse order.
    let mut rgvarg: Vec<VARIANT> = args.iter().rev().cloned().collect();
    let mut named_put = DISPID_PROPERTYPUT;
    let mut params = DISPPARAMS {
        rgvarg: rgvarg.as_mut_ptr(),
        rgdispidNamedArgs: ptr::null_mut(),
        cArgs: rgvarg.len() as u32,
        cNamedArgs: 0,
    };
    if flags == DISPATCH_PROPERTYPUT {
        params.rgdispidNamedArgs = &mut named_put;
        params.cNamedArgs = 1;
    }
    let mut result = VARIANT::default();
    unsafe {
        disp.Invoke(
            id,
            &GUID::zeroed(),
            LOCALE_USER_DEFAULT,
            flags,
            &params,
            Some(&mut result),
            None,
            None,
        )
        .map_err(|e| HostError::Interop(format!("'{name}' failed: {e}")))?;
    }
    Ok(result)
}

fn get(disp: &IDispatch, name: &str, args: &[VARIANT]) -> Result<VARIANT, HostError> {
    invoke(disp, name, DISPATCH_PROPERTYGET, args)
}

fn call(disp: &IDispatch, name: &str, args: &[VARIANT]) -> Result<VARIANT, HostError> {
    invoke(disp, name, DISPATCH_METHOD, args)
}

fn put(disp: &IDispatch, name: &str, value: VARIANT) -> Result<(), HostError> {
    invoke(disp, name, DISPATCH_PROPERTYPUT, &[value]).map(|_| ())
}

fn get_string(disp: &IDispatch, name: &str) -> Result<String, HostError> {
    let v = get(disp, name, &[])?;
    BSTR::try_from(&v)
        .map(|b| b.to_string())
        .map_err(|e| HostError::Interop(format!("'{name}' not a string: {e}")))
}

fn get_i32(disp: &IDispatch, name: &str) -> Result<i32, HostError> {
    let v = get(disp, name, &[])?;
    i32::try_from(&v).map_err(|e| HostError::Interop(format!("'{name}' not an integer: {e}")))
}

/// Reads an object-valued property; a null dispatch pointer maps to `None`
/// (Excel answers null for `ActiveWorkbook` when nothing is open).
fn get_object(disp: &IDispatch, name: &str) -> Result<Option<IDispatch>, HostError> {
    let v = get(disp, name, &[])?;
    Ok(IDispatch::try_from(&v).ok())
}

fn require_object(disp: &IDispatch, name: &str) -> Result<IDispatch, HostError> {
    get_object(disp, name)?
        .ok_or_else(|| HostError::Interop(format!("'{name}' returned no object")))
}

fn require_dispatch(v: VARIANT) -> Result<IDispatch, HostError> {
    IDispatch::try_from(&v).map_err(|e| HostError::Interop(format!("not an object: {e}")))
}

fn variant_to_cell_value(v: &VARIANT) -> CellValue {
    use windows::Win32::System::Variant::{
        VARENUM, VT_BOOL, VT_BSTR, VT_EMPTY, VT_I2, VT_I4, VT_NULL, VT_R4, VT_R8,
    };

    // Inspect the tag instead of letting VariantChangeType coerce: "123" in a
    // cell must stay text, 123 must stay a number.
    let vt = VARENUM(unsafe { v.as_raw().Anonymous.Anonymous.vt });
    match vt {
        VT_EMPTY | VT_NULL => CellValue::Empty,
        VT_BSTR => match BSTR::try_from(v) {
            Ok(b) if !b.is_empty() => CellValue::Text(b.to_string()),
            _ => CellValue::Empty,
        },
        VT_BOOL => bool::try_from(v).map(CellValue::Bool).unwrap_or(CellValue::Empty),
        VT_I2 | VT_I4 | VT_R4 | VT_R8 => f64::try_from(v)
            .map(CellValue::Number)
            .unwrap_or(CellValue::Empty),
        _ => CellValue::Empty,
    }
}
