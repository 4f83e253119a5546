//! Row adapters for the HR spreadsheet template.
//!
//! Column order is a contract with the spreadsheet. Reordering a row here
//! requires the same change to the template.

use clap::Args;

pub const EMPLOYEE_HEADERS: &[&str] = &[
    "Name",
    "TIN #",
    "SSS #",
    "Position",
    "Basic Pay",
    "GCash #",
    "Employee ID",
    "Hire Date",
];

pub const ATTENDANCE_HEADERS: &[&str] = &[
    "Date",
    "Employee ID",
    "Time In",
    "Time Out",
    "Selfie Photo URL",
    "Is Late",
    "Work Hours",
    "Has Night Diff",
];

pub const PAYROLL_HEADERS: &[&str] = &[
    "Period",
    "Employee ID",
    "Employee Name",
    "Basic Pay",
    "13th Month",
    "SSS Deduction",
    "PhilHealth Deduction",
    "Pag-IBIG Deduction",
    "Night Differential",
    "Gross Pay",
    "Total Deductions",
    "Net Pay",
    "Status",
];

pub const CONTRIBUTION_HEADERS: &[&str] = &[
    "Month",
    "SSS Rate",
    "PhilHealth Rate",
    "Pag-IBIG Amount",
    "Minimum Wage",
    "Notes",
];

pub const UTANG_HEADERS: &[&str] = &[
    "Date",
    "Employee ID",
    "Employee Name",
    "Amount",
    "Status",
    "Description",
];

#[derive(Debug, Clone, Default, Args)]
pub struct Employee {
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value = "")]
    pub tin: String,
    #[arg(long, default_value = "")]
    pub sss: String,
    #[arg(long, default_value = "")]
    pub position: String,
    #[arg(long, default_value = "")]
    pub basic_pay: String,
    #[arg(long, default_value = "")]
    pub gcash_number: String,
    #[arg(long)]
    pub id: String,
    #[arg(long, default_value = "")]
    pub hire_date: String,
}

impl Employee {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.tin.clone(),
            self.sss.clone(),
            self.position.clone(),
            self.basic_pay.clone(),
            self.gcash_number.clone(),
            self.id.clone(),
            self.hire_date.clone(),
        ]
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct AttendanceRecord {
    #[arg(long)]
    pub date: String,
    #[arg(long)]
    pub employee_id: String,
    #[arg(long, default_value = "")]
    pub time_in: String,
    #[arg(long, default_value = "")]
    pub time_out: String,
    /// URL of the time-in selfie.
    #[arg(long, default_value = "")]
    pub time_in_photo: String,
    #[arg(long)]
    pub is_late: bool,
    #[arg(long, default_value = "")]
    pub work_hours: String,
    #[arg(long)]
    pub has_night_differential: bool,
}

impl AttendanceRecord {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.employee_id.clone(),
            self.time_in.clone(),
            self.time_out.clone(),
            self.time_in_photo.clone(),
            sheet_bool(self.is_late),
            self.work_hours.clone(),
            sheet_bool(self.has_night_differential),
        ]
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct PayrollRecord {
    #[arg(long)]
    pub period: String,
    #[arg(long)]
    pub employee_id: String,
    #[arg(long, default_value = "")]
    pub employee_name: String,
    #[arg(long, default_value = "0")]
    pub basic_pay: String,
    #[arg(long, default_value = "0")]
    pub thirteenth_month: String,
    #[arg(long, default_value = "0")]
    pub sss_deduction: String,
    #[arg(long, default_value = "0")]
    pub philhealth_deduction: String,
    #[arg(long, default_value = "0")]
    pub pagibig_deduction: String,
    #[arg(long, default_value = "0")]
    pub night_differential: String,
    #[arg(long, default_value = "0")]
    pub gross_pay: String,
    #[arg(long, default_value = "0")]
    pub total_deductions: String,
    #[arg(long, default_value = "0")]
    pub net_pay: String,
    #[arg(long, default_value = "draft")]
    pub status: String,
}

impl PayrollRecord {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.period.clone(),
            self.employee_id.clone(),
            self.employee_name.clone(),
            self.basic_pay.clone(),
            self.thirteenth_month.clone(),
            self.sss_deduction.clone(),
            self.philhealth_deduction.clone(),
            self.pagibig_deduction.clone(),
            self.night_differential.clone(),
            self.gross_pay.clone(),
            self.total_deductions.clone(),
            self.net_pay.clone(),
            self.status.clone(),
        ]
    }
}

fn sheet_bool(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

pub fn header_row(headers: &[&str]) -> Vec<String> {
    headers.iter().map(|h| h.to_string()).collect()
}
