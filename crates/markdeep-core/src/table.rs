use crate::scanner::Scanner;

/// Filler for cells missing from a short row.
const NBSP: &str = "&#160;";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ColumnAlignment {
    #[default]
    None,
    Left,
    Right,
    Center,
}

impl ColumnAlignment {
    fn attribute(self) -> &'static str {
        match self {
            ColumnAlignment::None => "",
            ColumnAlignment::Left => " align=\"left\"",
            ColumnAlignment::Right => " align=\"right\"",
            ColumnAlignment::Center => " align=\"center\"",
        }
    }
}

/// Column layout taken from a separator row such as `|:--|--:|`, plus the
/// header and body rows collected around it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TableSpec {
    pub leading_bar: bool,
    pub trailing_bar: bool,
    pub columns: Vec<ColumnAlignment>,
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl TableSpec {
    /// Parses a separator row. Leaves the scanner wherever it stopped; the
    /// caller rewinds on `None`.
    pub(crate) fn parse(p: &mut Scanner<'_>) -> Option<TableSpec> {
        p.skip_linespace();
        if !matches!(p.current(), '|' | ':' | '-') {
            return None;
        }

        let mut spec: Option<TableSpec> = None;
        if p.skip_char('|') {
            spec = Some(TableSpec {
                leading_bar: true,
                ..TableSpec::default()
            });
        }

        loop {
            p.skip_linespace();
            if p.current() == '|' {
                return None;
            }

            let align_left = p.skip_char(':');
            while p.current() == '-' {
                p.skip_forward(1);
            }
            let align_right = p.skip_char(':');
            p.skip_linespace();

            let column = match (align_left, align_right) {
                (true, true) => ColumnAlignment::Center,
                (true, false) => ColumnAlignment::Left,
                (false, true) => ColumnAlignment::Right,
                (false, false) => ColumnAlignment::None,
            };

            if p.eol() {
                let mut spec = spec?;
                spec.columns.push(column);
                return Some(spec);
            }

            if !p.skip_char('|') {
                return None;
            }

            let current = spec.get_or_insert_with(TableSpec::default);
            current.columns.push(column);

            p.skip_linespace();
            if p.eol() {
                current.trailing_bar = true;
                return spec;
            }
        }
    }

    /// Parses one row and consumes its line ending. A blank line, a row
    /// missing the leading bar the separator had, or a row without any bar
    /// ends the table.
    pub(crate) fn parse_row(&self, p: &mut Scanner<'_>) -> Option<Vec<String>> {
        p.skip_linespace();
        if p.eol() {
            return None;
        }

        let mut any_bars = self.leading_bar;
        if self.leading_bar && !p.skip_char('|') {
            return None;
        }

        let mut row = Vec::new();
        while !p.eol() {
            p.mark();
            while !p.eol() && p.current() != '|' {
                p.skip_escapable_char(true);
            }
            row.push(p.extract().trim().to_string());
            any_bars |= p.skip_char('|');
        }

        if !any_bars {
            return None;
        }

        while row.len() < self.columns.len() {
            row.push(NBSP.to_string());
        }

        p.skip_eol();
        Some(row)
    }

    pub(crate) fn render(&self, out: &mut String, mut format_cell: impl FnMut(&mut String, &str)) {
        out.push_str("<table>\n");
        if let Some(headers) = &self.headers {
            out.push_str("<thead>\n<tr>\n");
            self.render_row(out, headers, "th", &mut format_cell);
            out.push_str("</tr>\n</thead>\n");
        }
        out.push_str("<tbody>\n");
        for row in &self.rows {
            out.push_str("<tr>\n");
            self.render_row(out, row, "td", &mut format_cell);
            out.push_str("</tr>\n");
        }
        out.push_str("</tbody>\n");
        out.push_str("</table>\n");
    }

    fn render_row(
        &self,
        out: &mut String,
        row: &[String],
        cell: &str,
        format_cell: &mut impl FnMut(&mut String, &str),
    ) {
        for (index, text) in row.iter().enumerate() {
            out.push_str("\t<");
            out.push_str(cell);
            if let Some(column) = self.columns.get(index) {
                out.push_str(column.attribute());
            }
            out.push('>');
            format_cell(out, text);
            out.push_str("</");
            out.push_str(cell);
            out.push_str(">\n");
        }
    }
}
