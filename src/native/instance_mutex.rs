//! Native API - named mutex
//!
//! Backs [`InstanceLock`](crate::instance::InstanceLock) on Windows. The kernel releases the mutex
//! (as abandoned) if the owning process dies, so a crashed instance never blocks the next one.
use widestring::U16CString;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, ERROR_ALREADY_EXISTS, HANDLE};
use windows::Win32::System::Threading::{CreateMutexW, ReleaseMutex};

#[derive(Debug)]
pub(crate) struct NamedMutex(HANDLE);

// The handle is only used to release and close the mutex on drop
unsafe impl Send for NamedMutex {}
unsafe impl Sync for NamedMutex {}

impl NamedMutex {
    /// Creates and owns the mutex called `name`, or returns `None` if it already exists
    pub(crate) fn try_acquire(name: &str) -> std::io::Result<Option<Self>> {
        let wide_name = U16CString::from_str_truncate(format!("Global\\{}", name));

        let handle = unsafe {
            // Safety: the name is a valid, null terminated widestring that outlives the call
            CreateMutexW(None, true, PCWSTR::from_raw(wide_name.as_ptr()))
        }
        .map_err(|_| std::io::Error::last_os_error())?;

        // CreateMutexW succeeds on an existing mutex, without giving us ownership
        if std::io::Error::last_os_error().raw_os_error() == Some(ERROR_ALREADY_EXISTS.0 as i32) {
            let _ = unsafe { CloseHandle(handle) };
            return Ok(None);
        }

        Ok(Some(Self(handle)))
    }
}

impl Drop for NamedMutex {
    fn drop(&mut self) {
        unsafe {
            // Safety: we own this handle, and the mutex was created with initial ownership
            if let Err(err) = ReleaseMutex(self.0) {
                log::warn!("Unable to release instance mutex: {:?}", err);
            }
            let _ = CloseHandle(self.0);
        }
    }
}
