//! HTML page template.

pub const CHART_JS_CDN: &str = "https://cdn.jsdelivr.net/npm/chart.js";

pub const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<script src="{chart_js}"></script>
<style>
{style}
</style>
</head>
<body>
<div class="container">
<header>
<h1>{title}</h1>
</header>
<section class="chart-container">
<h2>Section length</h2>
<canvas id="reportChart"></canvas>
</section>
{data_charts}
{preamble}
{sections}
</div>
<script>
const chartData = {chart_data};
new Chart(document.getElementById('reportChart').getContext('2d'), {
  type: 'bar',
  data: chartData,
  options: {
    responsive: true,
    plugins: { legend: { display: false } },
    scales: { y: { beginAtZero: true, title: { display: true, text: 'Characters' } } }
  }
});
const dataCharts = {data_chart_configs};
dataCharts.forEach((config, i) => {
  new Chart(document.getElementById('dataChart' + i).getContext('2d'), config);
});
document.getElementById('toggle-all') && document.getElementById('toggle-all').addEventListener('click', () => {
  const sections = document.querySelectorAll('details.report-section');
  const open = Array.from(sections).some(s => !s.open);
  sections.forEach(s => { s.open = open; });
});
</script>
</body>
</html>
"#;

pub const STYLE: &str = r#"body {
  font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
  line-height: 1.6;
  color: #24292f;
  background: #f6f8fa;
  margin: 0;
}
.container { max-width: 960px; margin: 0 auto; padding: 2rem 1rem; }
header h1 { border-bottom: 3px solid #0969da; padding-bottom: 0.5rem; }
.chart-container { background: #fff; border-radius: 8px; padding: 1rem; margin: 1.5rem 0; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
details.report-section { background: #fff; border-radius: 8px; margin: 1rem 0; padding: 0.5rem 1.25rem; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
details.report-section > summary { cursor: pointer; font-size: 1.4rem; font-weight: 600; padding: 0.5rem 0; }
.key-points { background: #ddf4ff; border-left: 4px solid #0969da; padding: 0.5rem 1rem; margin: 0.75rem 0; }
.key-points h3 { margin: 0.25rem 0; font-size: 1rem; }
#toggle-all { margin-bottom: 0.5rem; }
.data-charts { background: #fff; border-radius: 8px; padding: 1rem; margin: 1.5rem 0; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
.data-chart { max-width: 720px; margin: 1rem auto; }
pre { background: #f6f8fa; padding: 0.75rem; overflow-x: auto; }
table { border-collapse: collapse; }
th, td { border: 1px solid #d0d7de; padding: 0.25rem 0.5rem; }
blockquote { color: #57606a; border-left: 4px solid #d0d7de; margin: 0; padding: 0 1rem; }"#;
