//! Trigger association through `trigger/current_trigger`.

use std::sync::Arc;

use tracing::debug;

use iio_core::{AttrScope, Context, Device, IioError, Result};

const CURRENT_TRIGGER: &str = "trigger/current_trigger";

/// Trigger currently driving `device`, if any.
///
/// The kernel reports the trigger by name; a name no device of the context
/// carries is [`IioError::NoSuchDevice`].
pub fn current_trigger(ctx: &Context, device: &Device) -> Result<Option<Arc<Device>>> {
    let name = ctx
        .io()
        .read_attr(device, AttrScope::Device, CURRENT_TRIGGER)?;
    if name.is_empty() {
        return Ok(None);
    }

    ctx.devices()
        .iter()
        .find(|d| d.name.as_deref() == Some(name.as_str()))
        .cloned()
        .map(Some)
        .ok_or(IioError::NoSuchDevice { id: name })
}

/// Attach `trigger` to `device`, or detach the current one with `None`.
pub fn set_trigger(ctx: &Context, device: &Device, trigger: Option<&Device>) -> Result<()> {
    let name = match trigger {
        Some(t) => t.name.as_deref().unwrap_or(&t.id),
        None => "",
    };
    ctx.io()
        .write_attr(device, AttrScope::Device, CURRENT_TRIGGER, name)?;
    debug!(device = %device.id, trigger = name, "Set trigger");
    Ok(())
}
