//! Core UI controls and their extension overrides

pub mod controls;
pub mod overrides;

pub use controls::{
    is_core_control, ControlSnapshot, ControlSurface, DefaultControlSurface, ProjectKind,
    CORE_CONTROLS, DYNAMIC_CONTROL,
};
pub use overrides::{
    ControlInvocation, ControlState, CoreButtonOverride, OverrideResolver, RenderedControl,
};
