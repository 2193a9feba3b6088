//! Controllers wired straight to components, without agents or the bus.

use hydro_control::Controller;
use hydro_core::ComponentIdx;

/// Reads `field` of the sensor component at the start of each tick and
/// writes the controller output as control `control` of the actuator.
pub struct ControllerBinding {
    pub(crate) name:       String,
    pub(crate) controller: Box<dyn Controller>,
    pub(crate) sensor:     String,
    pub(crate) field:      String,
    pub(crate) actuator:   String,
    pub(crate) control:    String,
    /// Resolved at build.
    pub(crate) sensor_idx:   ComponentIdx,
    pub(crate) actuator_idx: ComponentIdx,
}

impl ControllerBinding {
    pub fn new<C: Controller + 'static>(
        name:       impl Into<String>,
        controller: C,
        sensor:     impl Into<String>,
        field:      impl Into<String>,
        actuator:   impl Into<String>,
        control:    impl Into<String>,
    ) -> Self {
        Self {
            name:         name.into(),
            controller:   Box::new(controller),
            sensor:       sensor.into(),
            field:        field.into(),
            actuator:     actuator.into(),
            control:      control.into(),
            sensor_idx:   ComponentIdx::INVALID,
            actuator_idx: ComponentIdx::INVALID,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }
}
