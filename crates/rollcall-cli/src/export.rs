use csv::Writer;
use serde::Deserialize;
use std::io::Write;

/// One attendance row as returned by `GetAttendance`.
#[derive(Debug, Deserialize)]
pub struct AttendanceRow {
    pub name: String,
    pub roll: String,
    pub timestamp: String,
}

/// Write attendance rows as CSV with a `Name,Roll Number,Timestamp` header.
pub fn write_csv<W: Write>(writer: W, rows: &[AttendanceRow]) -> csv::Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["Name", "Roll Number", "Timestamp"])?;
    for row in rows {
        wtr.write_record([&row.name, &row.roll, &row.timestamp])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_csv() {
        let rows: Vec<AttendanceRow> = serde_json::from_str(
            r#"[{"name":"Ada","roll":"R001","timestamp":"2026-03-02 09:00:00"},
                {"name":"Lovelace, A.","roll":"R002","timestamp":"2026-03-02 09:05:00"}]"#,
        )
        .unwrap();

        let mut out = Vec::new();
        write_csv(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "Name,Roll Number,Timestamp\n\
             Ada,R001,2026-03-02 09:00:00\n\
             \"Lovelace, A.\",R002,2026-03-02 09:05:00\n"
        );
    }

    #[test]
    fn test_write_csv_empty() {
        let mut out = Vec::new();
        write_csv(&mut out, &[]).unwrap();
        assert_eq!(out, b"Name,Roll Number,Timestamp\n");
    }
}
