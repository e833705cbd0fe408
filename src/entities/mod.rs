// Entity records and their data-access functions.
//
// Every cross-entity link is a plain foreign-key field; related records are
// fetched with an explicit query (get_resident_medications, ...), never loaded
// implicitly.

pub mod bed;
pub mod billing;
pub mod checkup;
pub mod document;
pub mod event;
pub mod medication;
pub mod resident;
pub mod staff;
pub mod visitor;

pub use bed::{Bed, BedStatus, NewBed};
pub use billing::{Billing, Charges, NewBilling, PaymentStatus};
pub use checkup::{Checkup, CheckupStatus, NewCheckup};
pub use document::{Document, NewDocument};
pub use event::{Event, EventStatus, NewEvent};
pub use medication::{Medication, NewMedication};
pub use resident::{NewResident, Resident, ResidentStatus, ResidentUpdate};
pub use staff::{NewStaff, Staff};
pub use visitor::{NewVisitor, Visitor};
