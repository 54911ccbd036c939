//! 前台挂号演示：录入、收费、出号、签到

use anyhow::Result;
use clinic::core::{Clock, Gender, SystemClock};
use clinic::store::InMemoryClinicStore;
use clinic::workflow::{Receipt, ReceiptPrinter, ReceptionDesk, StaffRole, DEFAULT_REGISTRATION_CHARGE};
use std::sync::Arc;
use tracing::info;

struct ConsolePrinter;

impl ReceiptPrinter for ConsolePrinter {
    fn print(&self, receipt: &Receipt) -> clinic::core::Result<()> {
        println!("----------------------------------------");
        println!("Token:        {}", receipt.token);
        println!("Patient:      {}", receipt.patient_name);
        println!("Doctor:       {} ({})", receipt.doctor, receipt.department);
        println!("Consultation: {}", receipt.consultation_fee);
        println!("Registration: {}", receipt.registration_charge);
        println!("Total:        {}", receipt.total);
        println!("Issued at:    {}", receipt.issued_at.format("%Y-%m-%d %H:%M"));
        println!("----------------------------------------");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryClinicStore::new(clock.clone()));
    let mehta = store.add_doctor("Dr. Mehta", "Cardiology", Some(500)).await?;
    store.add_doctor("Dr. Iyer", "Orthopedics", Some(400)).await?;

    let desk = ReceptionDesk::new(store.clone(), clock, DEFAULT_REGISTRATION_CHARGE);
    let mut workflow = desk.start_registration();

    {
        let draft = workflow.draft_mut()?;
        draft.patient.name = "Asha Rao".to_string();
        draft.patient.age = Some(34);
        draft.patient.gender = Some(Gender::Female);
        draft.patient.contact = "9876543210".to_string();
        draft.patient.address = "12 MG Road, Pune".to_string();
        draft.symptoms = "Chest pain".to_string();
    }
    workflow.select_department("Cardiology").await?;
    workflow.select_doctor(mehta.id)?;
    for warning in workflow.warnings() {
        info!("Intake warning: {:?}", warning);
    }

    let summary = workflow.advance_to_payment()?;
    info!(
        "Payable: {} consultation + {} registration = {}",
        summary.consultation_fee, summary.registration_charge, summary.total
    );

    workflow.confirm_payment().await?;
    workflow.print_receipt(&ConsolePrinter)?;
    let receipt = workflow.finish()?;

    for entry in desk.live_queue().await? {
        info!(
            "#{} {} {} waited {} min ({:?})",
            entry.position,
            entry.record.token,
            entry.record.patient_name(),
            entry.wait_minutes,
            entry.band
        );
    }

    let record = desk.check_in(receipt.visit_id, StaffRole::Receptionist).await?;
    info!("{} is now {}", record.patient_name(), record.status);
    info!("Waiting after check-in: {}", desk.live_queue().await?.len());

    Ok(())
}
