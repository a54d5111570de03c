//! Test data builders for creating test objects

use tensile_daq::types::{ChannelRole, ChannelSpec, SpecimenGeometry, UnitSystem, WiringMode};

/// Builder for creating test ChannelSpecs
pub struct ChannelSpecBuilder {
    device: String,
    index: u32,
    wiring: WiringMode,
    role: ChannelRole,
}

impl ChannelSpecBuilder {
    pub fn force(index: u32) -> Self {
        Self {
            device: "Dev1".to_string(),
            index,
            wiring: WiringMode::Differential,
            role: ChannelRole::Force,
        }
    }

    pub fn elongation(index: u32) -> Self {
        Self {
            device: "Dev1".to_string(),
            index,
            wiring: WiringMode::ReferencedSingleEnded,
            role: ChannelRole::Elongation,
        }
    }

    pub fn device(mut self, device: &str) -> Self {
        self.device = device.to_string();
        self
    }

    pub fn wiring(mut self, wiring: WiringMode) -> Self {
        self.wiring = wiring;
        self
    }

    pub fn build(self) -> ChannelSpec {
        ChannelSpec::new(&self.device, self.index, self.wiring, self.role)
    }
}

/// Load cell on ai3 (differential), extensometer on ai1 (RSE)
pub fn rig_channels() -> Vec<ChannelSpec> {
    vec![
        ChannelSpecBuilder::force(3).build(),
        ChannelSpecBuilder::elongation(1).build(),
    ]
}

/// Square-inch specimen with a one-inch gauge length
pub fn unit_geometry() -> SpecimenGeometry {
    SpecimenGeometry::new(1.0, 1.0, UnitSystem::English).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_spec_builder() {
        let spec = ChannelSpecBuilder::force(2)
            .device("Dev2")
            .wiring(WiringMode::ReferencedSingleEnded)
            .build();

        assert_eq!(spec.physical_channel, "Dev2/ai2");
        assert_eq!(spec.wiring, WiringMode::ReferencedSingleEnded);
        assert_eq!(spec.role, ChannelRole::Force);
    }
}
