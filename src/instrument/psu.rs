//! Programmable DC power supply (Keysight E36300-style SCPI).

use super::session::{CloseOutcome, InstrumentSession};
use super::Channel;
use crate::error::AppResult;

pub struct PowerSupply {
    session: InstrumentSession,
}

impl PowerSupply {
    pub fn new(session: InstrumentSession) -> Self {
        Self { session }
    }

    pub fn session_mut(&mut self) -> &mut InstrumentSession {
        &mut self.session
    }

    /// Select the channel, pre-load the first set-point and set the current limit.
    ///
    /// Output stays off; [`PowerSupply::enable_output`] is a separate step.
    pub async fn configure(
        &mut self,
        channel: Channel,
        initial_voltage: f64,
        current_limit: f64,
    ) -> AppResult<()> {
        self.session
            .write(&format!("INST:NSEL {}", channel.number()))
            .await?;
        self.set_voltage(initial_voltage).await?;
        self.session
            .write(&format!("CURR {}", current_limit))
            .await
    }

    pub async fn set_voltage(&mut self, volts: f64) -> AppResult<()> {
        self.session.write(&format!("VOLT {}", volts)).await
    }

    pub async fn enable_output(&mut self) -> AppResult<()> {
        self.session.write("OUTP ON").await
    }

    pub async fn disable_output(&mut self) -> AppResult<()> {
        self.session.write("OUTP OFF").await
    }

    pub async fn close(&mut self) -> CloseOutcome {
        self.session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockBench;
    use crate::instrument::InstrumentRole;
    use std::time::Duration;

    async fn supply(bench: &MockBench) -> PowerSupply {
        let session = InstrumentSession::connect(
            bench,
            InstrumentRole::PowerSupply,
            MockBench::PSU_RESOURCE,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        PowerSupply::new(session)
    }

    #[tokio::test]
    async fn test_configure_sequence() {
        let bench = MockBench::new();
        let mut psu = supply(&bench).await;

        psu.configure(Channel::Two, 0.5, 1.0).await.unwrap();
        assert_eq!(bench.psu.writes(), vec!["INST:NSEL 2", "VOLT 0.5", "CURR 1"]);
    }

    #[tokio::test]
    async fn test_output_switching() {
        let bench = MockBench::new();
        let mut psu = supply(&bench).await;

        psu.enable_output().await.unwrap();
        psu.set_voltage(3.25).await.unwrap();
        psu.disable_output().await.unwrap();
        assert_eq!(bench.psu.writes(), vec!["OUTP ON", "VOLT 3.25", "OUTP OFF"]);
        assert_eq!(psu.close().await, CloseOutcome::Closed);
    }
}
