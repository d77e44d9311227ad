// End-to-end: funding + claims exports → summary workbook

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use funding_summary::report::write_xlsx_file;
use funding_summary::{FundingWindow, Month, Pipeline, PipelineOutcome, ReportTable, Table};
use rust_decimal_macros::dec;

const CLAIMS: &str = "\
Child,All Claims Confirmed by Parent?,Date of Birth,CHICK,Claim Until
Alice Byrne,Yes,14/03/2021,CH-1001,10/01/2025
Cara Doyle,Yes,02/09/2020,CH-1002,30/06/2025
Dan Kelly,No,02/09/2020,CH-1003,30/06/2025
";

/// Two weekly allocations per month
fn funding_csv() -> String {
    let mut csv = String::from("Child,Allocation Date,Allocation Description,Allocation Value\n");

    let alice_term = [(2024, 8), (2024, 9), (2024, 10)];
    let alice_holiday = [
        (2024, 12),
        (2025, 1),
        (2025, 2),
        (2025, 3),
        (2025, 4),
        (2025, 5),
        (2025, 6),
        (2025, 7),
    ];

    for (year, month) in alice_term {
        for day in [5, 19] {
            csv.push_str(&format!(
                "Alice Byrne,{:02}/{:02}/{},15.0 hours x €4.80,72.00\n",
                day, month, year
            ));
        }
    }
    for (year, month) in alice_holiday {
        for day in [3, 17] {
            csv.push_str(&format!(
                "Alice Byrne,{:02}/{:02}/{},6 hours x €4.80,28.80\n",
                day, month, year
            ));
        }
    }

    csv.push_str("Cara Doyle,05/08/2024,10 hours x €5.00,50.00\n");
    csv.push_str("Cara Doyle,04/11/2024,12 hours x €5.00,60.00\n");
    csv.push_str("Cara Doyle,03/03/2025,15 hours x €5.00,75.00\n");

    // Previous funding year correction, ignored
    csv.push_str("Alice Byrne,29/07/2024,15 hours x €4.80,72.00\n");

    // Funded but not confirmed
    csv.push_str("Dan Kelly,05/08/2024,15 hours x €4.80,72.00\n");

    csv
}

fn run() -> ReportTable {
    let funding = Table::from_csv_bytes("funding.csv", funding_csv().as_bytes()).unwrap();
    let claims = Table::from_csv_bytes("claims.csv", CLAIMS.as_bytes()).unwrap();

    let pipeline = Pipeline::new(FundingWindow::for_year(2024));
    match pipeline.run(&funding, &claims, None).unwrap() {
        PipelineOutcome::Complete(table) => table,
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_term_and_holiday_child() {
    let table = run();
    let alice = &table.rows[0];

    assert_eq!(alice.name, "Alice Byrne");
    assert_eq!(alice.term_pattern_label, "6/15");
    assert_eq!(alice.claim_id, "CH-1001");

    for month in [Month::Aug, Month::Sep, Month::Oct] {
        assert_eq!(alice.month_value(month), Some(dec!(144.00)), "{}", month);
    }
    assert_eq!(alice.month_value(Month::Nov), None);
    for month in [
        Month::Dec,
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
    ] {
        assert_eq!(alice.month_value(month), Some(dec!(57.60)), "{}", month);
    }

    // 3 × 144.00 + 8 × 57.60
    assert_eq!(alice.total_value, dec!(892.80));
}

#[test]
fn test_irregular_child() {
    let table = run();
    let cara = &table.rows[1];

    assert_eq!(cara.name, "Cara Doyle");
    assert_eq!(cara.term_pattern_label, "10-12-15");
    assert_eq!(cara.total_value, dec!(185.00));
}

#[test]
fn test_unconfirmed_child_is_left_out() {
    let table = run();
    let names: Vec<&str> = table.rows.iter().map(|row| row.name.as_str()).collect();

    assert_eq!(names, vec!["Alice Byrne", "Cara Doyle"]);
}

#[test]
fn test_workbook_on_disk() {
    let table = run();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("funding_data_summary.xlsx");
    let now = NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();

    write_xlsx_file(&table, now, &path).unwrap();

    let mut workbook = open_workbook_auto(&path).unwrap();
    let range = workbook.worksheet_range_at(0).unwrap().unwrap();

    assert_eq!(range.get_size(), (3, 18));
    assert_eq!(
        range.get_value((1, 4)),
        Some(&Data::String("6/15".to_string()))
    );
    assert_eq!(
        range.get_value((2, 4)),
        Some(&Data::String("10-12-15".to_string()))
    );
    match range.get_value((1, 5)) {
        Some(Data::Float(total)) => assert!((total - 892.8).abs() < 1e-9),
        other => panic!("unexpected total cell: {:?}", other),
    }
    // Nov (column 9) is blank for Alice
    assert!(matches!(range.get_value((1, 9)), None | Some(Data::Empty)));
}
