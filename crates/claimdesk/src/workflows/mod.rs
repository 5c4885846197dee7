pub mod reimbursement;
