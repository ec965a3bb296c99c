//
// GDI screen grabber for the primary monitor (Windows only).
//

use anyhow::{Context, bail};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CreateCompatibleBitmap, CreateCompatibleDC,
    DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, ReleaseDC, SRCCOPY, SelectObject,
};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use crate::frame::VideoFrame;
use crate::screen::{ScreenGrabber, bgra_to_frame};

#[derive(Debug, Default, Clone, Copy)]
pub struct GdiScreen;

impl ScreenGrabber for GdiScreen {
    fn grab(&self) -> anyhow::Result<VideoFrame> {
        let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if w <= 0 || h <= 0 {
            bail!("invalid screen dimensions ({w} x {h})");
        }

        let mut bgra = vec![0u8; w as usize * h as usize * 4];
        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: w,
                // Negative height asks for top-down rows.
                biHeight: -h,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0 as u32,
                ..Default::default()
            },
            ..Default::default()
        };

        unsafe {
            let screen = GetDC(None);
            if screen.is_invalid() {
                bail!("failed to get the screen device context");
            }
            let mem = CreateCompatibleDC(Some(screen));
            if mem.is_invalid() {
                ReleaseDC(None, screen);
                bail!("failed to create a compatible device context");
            }
            let bitmap = CreateCompatibleBitmap(screen, w, h);
            if bitmap.is_invalid() {
                let _ = DeleteDC(mem);
                ReleaseDC(None, screen);
                bail!("failed to create a compatible bitmap");
            }

            let previous = SelectObject(mem, bitmap.into());
            let blit = BitBlt(mem, 0, 0, w, h, Some(screen), 0, 0, SRCCOPY);
            // The bitmap must not be selected into a DC while its bits are read.
            SelectObject(mem, previous);
            let lines = GetDIBits(
                mem,
                bitmap,
                0,
                h as u32,
                Some(bgra.as_mut_ptr().cast()),
                &mut info,
                DIB_RGB_COLORS,
            );

            let _ = DeleteObject(bitmap.into());
            let _ = DeleteDC(mem);
            ReleaseDC(None, screen);

            blit.context("BitBlt from the screen")?;
            if lines == 0 {
                bail!("GetDIBits returned no rows");
            }
        }

        Ok(bgra_to_frame(w as u32, h as u32, &bgra))
    }
}
